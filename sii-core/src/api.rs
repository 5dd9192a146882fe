//! Invoice submission pipeline against the AEAT SII SOAP endpoint.
//!
//! The pipeline is transform, envelope, sign, timestamp (best-effort), send
//! with retry, parse. Transport is a trait so the pipeline can be exercised
//! without a network; the production [`HttpTransport`] speaks HTTPS with the
//! PKCS#12 client identity (AEAT authenticates submitters via mutual TLS).
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::cert::CertificateStore;
use crate::config::{SiiConfig, TsaConfig};
use crate::invoice::Invoice;
use crate::retry::RetryPolicy;
use crate::signer::{SignatureError, XmlSigner};
use crate::soap::{build_envelope, parse_response, Estado, ResponseParseError, SOAP_ACTION};
use crate::timestamp::{TimestampClient, TimestampOutcome};
use crate::transform::transform_invoice;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout)
    }
}

/// Raw SOAP reply: HTTP status plus body, before any XML parsing.
#[derive(Debug, Clone)]
pub struct SoapReply {
    pub status: u16,
    pub body: String,
}

/// One SOAP round trip. Implementations must not retry internally; retry
/// policy lives in [`SiiClient`].
pub trait SoapTransport {
    fn send(
        &self,
        url: &str,
        action: &str,
        envelope: &str,
    ) -> impl Future<Output = Result<SoapReply, TransportError>> + Send;
}

#[derive(Debug, Error)]
pub enum SiiError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Response(#[from] ResponseParseError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("service returned HTTP {status}")]
    Http { status: u16 },
    #[error("client state error: {0}")]
    ClientState(String),
}

/// Transient failures worth another attempt: connection-level errors and 5xx.
/// Client errors (4xx) and response-shape problems are final.
fn is_retryable(err: &SiiError) -> bool {
    match err {
        SiiError::Transport(t) => t.is_retryable(),
        SiiError::Http { status } => *status >= 500,
        _ => false,
    }
}

/// Outcome of a submission that reached the service and produced a parseable
/// response. A rejected invoice is a non-success result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub success: bool,
    /// Registration state reported by AEAT; absent when the submission never
    /// produced a parseable response.
    pub estado: Option<Estado>,
    /// AEAT's secure verification code, present on accepted registrations.
    pub csv: Option<String>,
    pub errors: Vec<String>,
    /// Reason the trusted timestamp was skipped, when it was.
    pub timestamp_omitted: Option<String>,
    pub raw_response: String,
}

/// HTTPS transport with the submitter's client-certificate identity.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the TLS client. The PKCS#12 identity comes from the loaded
    /// signing identity; PEM-loaded identities use their key/certificate pair.
    /// Server certificate validation is relaxed only in test mode.
    pub fn new(
        config: &SiiConfig,
        identity: &crate::cert::SigningIdentity,
    ) -> Result<Self, SiiError> {
        let tls_identity = match identity.pkcs12_der() {
            Some((der, password)) => reqwest::Identity::from_pkcs12_der(der, password)
                .map_err(|e| SiiError::ClientState(format!("client identity rejected: {e}")))?,
            None => reqwest::Identity::from_pkcs8_pem(
                identity.certificate_pem().as_bytes(),
                identity.private_key_pem().as_bytes(),
            )
            .map_err(|e| SiiError::ClientState(format!("client identity rejected: {e}")))?,
        };

        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .identity(tls_identity);
        if config.test_mode() {
            warn!(
                target: "sii::api",
                "test mode: server certificate validation is disabled",
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| SiiError::ClientState(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl SoapTransport for HttpTransport {
    fn send(
        &self,
        url: &str,
        action: &str,
        envelope: &str,
    ) -> impl Future<Output = Result<SoapReply, TransportError>> + Send {
        let request = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", action)
            .body(envelope.to_string());
        async move {
            let response = request.send().await.map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(map_reqwest_error)?;
            Ok(SoapReply { status, body })
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        classify_error_message(&err.to_string())
    }
}

/// Fallback classification by message text, for connection-level failures that
/// surface under an unexpected error kind.
fn classify_error_message(message: &str) -> TransportError {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("etimedout") {
        TransportError::Timeout
    } else if lower.contains("connection refused")
        || lower.contains("econnrefused")
        || lower.contains("connection reset")
        || lower.contains("econnreset")
        || lower.contains("dns error")
        || lower.contains("failed to lookup address")
    {
        TransportError::Connect(message.to_string())
    } else {
        TransportError::Other(message.to_string())
    }
}

/// Client for the SII invoice-registration service.
pub struct SiiClient<T = HttpTransport> {
    config: SiiConfig,
    store: CertificateStore,
    signer: XmlSigner,
    timestamp: Option<TimestampClient>,
    transport: T,
    retry: RetryPolicy,
}

impl SiiClient<HttpTransport> {
    /// Build a production client. Loads and validates the signing identity
    /// immediately so a bad keystore fails here instead of mid-submission.
    ///
    /// # Errors
    /// [`SiiError::ClientState`] when the identity cannot be loaded, its
    /// certificate fails validation, or the TLS client cannot be built.
    pub fn new(config: SiiConfig) -> Result<Self, SiiError> {
        let store = CertificateStore::new();
        let identity = store
            .load_from_p12(config.certificate_path(), config.certificate_password())
            .ok_or_else(|| {
                SiiError::ClientState(format!(
                    "could not load signing identity from {}",
                    config.certificate_path().display()
                ))
            })?;
        let validation = store.validate_certificate(&identity);
        if !validation.valid {
            return Err(SiiError::ClientState(format!(
                "signing certificate rejected: {}",
                validation.errors.join("; ")
            )));
        }
        let transport = HttpTransport::new(&config, &identity)?;
        Ok(Self::with_transport_and_store(config, transport, store))
    }
}

impl<T: SoapTransport> SiiClient<T> {
    /// Build a client over a custom transport. Used by tests and by callers
    /// that tunnel SOAP through something other than direct HTTPS.
    pub fn with_transport(config: SiiConfig, transport: T) -> Self {
        Self::with_transport_and_store(config, transport, CertificateStore::new())
    }

    fn with_transport_and_store(config: SiiConfig, transport: T, store: CertificateStore) -> Self {
        let retry = RetryPolicy::new(config.retry_attempts(), config.retry_delay());
        Self {
            config,
            store,
            signer: XmlSigner::new(),
            timestamp: None,
            transport,
            retry,
        }
    }

    /// Enable best-effort trusted timestamping of the signed envelope.
    pub fn with_timestamping(mut self, tsa: TsaConfig) -> Self {
        self.timestamp = Some(TimestampClient::new(tsa));
        self
    }

    pub fn config(&self) -> &SiiConfig {
        &self.config
    }

    /// Register one invoice. Never fails: failures that prevented a response
    /// (bad keystore, exhausted retries, unparseable reply) come back as a
    /// `success: false` result carrying the error text.
    pub async fn submit_invoice(&self, invoice: &Invoice) -> SubmissionResult {
        match self.try_submit_invoice(invoice).await {
            Ok(result) => result,
            Err(err) => SubmissionResult {
                success: false,
                estado: None,
                csv: None,
                errors: vec![err.to_string()],
                timestamp_omitted: None,
                raw_response: String::new(),
            },
        }
    }

    /// Register one invoice, distinguishing pipeline failures from AEAT
    /// rejections.
    ///
    /// A response from AEAT, even a rejection, is an `Ok` result; errors are
    /// reserved for failures that prevented a parseable response.
    pub async fn try_submit_invoice(
        &self,
        invoice: &Invoice,
    ) -> Result<SubmissionResult, SiiError> {
        let record = transform_invoice(invoice);
        info!(
            target: "sii::api",
            invoice = %record.invoice_number,
            period = %record.period,
            "submitting invoice",
        );

        let envelope = build_envelope(&record);

        let identity = self
            .store
            .load_from_p12(
                self.config.certificate_path(),
                self.config.certificate_password(),
            )
            .ok_or_else(|| {
                SiiError::ClientState(format!(
                    "could not load signing identity from {}",
                    self.config.certificate_path().display()
                ))
            })?;
        let signed = self.signer.sign(
            &envelope,
            identity.private_key_pem(),
            identity.certificate_pem(),
        )?;

        let (payload, timestamp_omitted) = match &self.timestamp {
            Some(client) => match client.add_timestamp(&signed).await {
                TimestampOutcome::Applied { xml } => (xml, None),
                TimestampOutcome::Omitted { xml, reason } => (xml, Some(reason)),
            },
            None => (signed, None),
        };

        let transport = &self.transport;
        let url = self.config.api_url();
        let payload_ref: &str = &payload;
        let reply = self
            .retry
            .run(
                "SII submission",
                move || {
                    let send = transport.send(url, SOAP_ACTION, payload_ref);
                    async move {
                        let reply = send.await?;
                        if reply.status >= 400 {
                            return Err(SiiError::Http {
                                status: reply.status,
                            });
                        }
                        Ok(reply)
                    }
                },
                is_retryable,
            )
            .await?;

        let response = parse_response(&reply.body)?;
        let success = response.estado.is_accepted();
        if success {
            info!(
                target: "sii::api",
                invoice = %record.invoice_number,
                csv = %response.csv,
                estado = ?response.estado,
                "invoice registered",
            );
        } else {
            warn!(
                target: "sii::api",
                invoice = %record.invoice_number,
                code = response.error_code.as_deref().unwrap_or("-"),
                "invoice rejected",
            );
        }

        let mut errors = Vec::new();
        if let Some(code) = &response.error_code {
            let description = response
                .error_description
                .clone()
                .unwrap_or_else(|| "unspecified error".to_string());
            errors.push(format!("{code}: {description}"));
        }

        Ok(SubmissionResult {
            success,
            estado: Some(response.estado),
            csv: (!response.csv.is_empty()).then(|| response.csv.clone()),
            errors,
            timestamp_omitted,
            raw_response: reply.body,
        })
    }
}
