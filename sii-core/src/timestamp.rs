//! RFC 3161-style trusted timestamps over signed documents.
//!
//! Timestamping is best-effort: a submission must not fail because the TSA is
//! down, so [`TimestampClient::add_timestamp`] never errors. It returns a
//! [`TimestampOutcome`] that either carries the timestamped document or the
//! original input plus the reason the timestamp was omitted.
//!
//! The request framing is a simplified RFC 3161 profile (version byte,
//! algorithm identifier, SHA-256 imprint, 8-byte nonce) rather than a full DER
//! `TimeStampReq`, and the token is the base64 of the whole TSA reply. It is
//! not interoperable with DER-only TSA endpoints.
use std::time::Duration;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TsaConfig;
use crate::retry::RetryPolicy;
use crate::xml::{descendant_text, find_descendant};

const TSA_RETRY_ATTEMPTS: u32 = 3;
const TSA_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Maximum tolerated clock skew for the TSA's reported time.
const MAX_FUTURE_SKEW: chrono::Duration = chrono::Duration::seconds(60);

const REQUEST_VERSION: u8 = 0x01;
const SHA256_ALGORITHM_ID: [u8; 2] = [0x02, 0x09];

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("timestamp authority unavailable: {0}")]
    TsaUnavailable(String),
    #[error("timestamp authority request timed out")]
    Timeout,
    #[error("invalid timestamp response: {0}")]
    InvalidResponse(String),
    #[error("document cannot be timestamped: {0}")]
    InvalidXml(String),
}

impl TimestampError {
    fn is_retryable(&self) -> bool {
        matches!(self, TimestampError::TsaUnavailable(_) | TimestampError::Timeout)
    }
}

/// Result of a timestamp attempt. Both variants carry a complete document;
/// `Omitted` returns the input unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampOutcome {
    Applied { xml: String },
    Omitted { xml: String, reason: String },
}

impl TimestampOutcome {
    pub fn was_applied(&self) -> bool {
        matches!(self, TimestampOutcome::Applied { .. })
    }

    pub fn into_xml(self) -> String {
        match self {
            TimestampOutcome::Applied { xml } => xml,
            TimestampOutcome::Omitted { xml, .. } => xml,
        }
    }
}

/// Client for a single timestamp authority endpoint.
pub struct TimestampClient {
    config: TsaConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl TimestampClient {
    pub fn new(config: TsaConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            retry: RetryPolicy::new(TSA_RETRY_ATTEMPTS, TSA_RETRY_BASE_DELAY),
        }
    }

    /// Add a trusted timestamp to a signed document.
    ///
    /// The `SigningTime` and `TimeStampToken` elements are inserted just
    /// before the closing `Signature` tag; the enveloped digest excludes the
    /// `Signature` subtree, so the insertion never invalidates the signature.
    pub async fn add_timestamp(&self, signed_xml: &str) -> TimestampOutcome {
        let signature_value = match extract_signature_value(signed_xml) {
            Ok(value) => value,
            Err(err) => return self.omitted(signed_xml, err),
        };

        if self.config.stub_enabled() {
            let now = Utc::now();
            let token = Base64::encode_string(
                format!("stub-timestamp:{}", now.to_rfc3339()).as_bytes(),
            );
            debug!(target: "sii::timestamp", "stub timestamp applied");
            return match insert_timestamp(signed_xml, now, &token) {
                Ok(xml) => TimestampOutcome::Applied { xml },
                Err(err) => self.omitted(signed_xml, err),
            };
        }

        let imprint = signature_imprint(&signature_value);
        let request = timestamp_request(&imprint);

        let fetched = self
            .retry
            .run(
                "timestamp request",
                || self.request_token(&request),
                TimestampError::is_retryable,
            )
            .await;

        match fetched {
            Ok((time, token)) => match insert_timestamp(signed_xml, time, &token) {
                Ok(xml) => {
                    debug!(target: "sii::timestamp", time = %time.to_rfc3339(), "timestamp applied");
                    TimestampOutcome::Applied { xml }
                }
                Err(err) => self.omitted(signed_xml, err),
            },
            Err(err) => self.omitted(signed_xml, err),
        }
    }

    fn omitted(&self, signed_xml: &str, err: TimestampError) -> TimestampOutcome {
        warn!(
            target: "sii::timestamp",
            tsa_url = self.config.tsa_url(),
            "timestamp omitted: {err}",
        );
        TimestampOutcome::Omitted {
            xml: signed_xml.to_string(),
            reason: err.to_string(),
        }
    }

    async fn request_token(
        &self,
        request: &[u8],
    ) -> Result<(DateTime<Utc>, String), TimestampError> {
        let mut builder = self
            .http
            .post(self.config.tsa_url())
            .header("Content-Type", "application/timestamp-query")
            .timeout(self.config.timeout())
            .body(request.to_vec());
        if let (Some(username), Some(password)) = (self.config.username(), self.config.password()) {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TimestampError::Timeout
            } else {
                TimestampError::TsaUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(TimestampError::TsaUnavailable(format!(
                "TSA returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(TimestampError::InvalidResponse(format!(
                "TSA returned {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TimestampError::TsaUnavailable(e.to_string()))?;
        parse_timestamp_reply(&body, Utc::now())
    }
}

/// `SignatureValue` of the first signature, base64-decoded.
fn extract_signature_value(signed_xml: &str) -> Result<Vec<u8>, TimestampError> {
    let doc = libxml::parser::Parser::default()
        .parse_string(signed_xml)
        .map_err(|e| TimestampError::InvalidXml(format!("{e:?}")))?;
    let root = doc
        .get_root_element()
        .ok_or_else(|| TimestampError::InvalidXml("empty document".into()))?;
    let signature = find_descendant(&root, "Signature")
        .ok_or_else(|| TimestampError::InvalidXml("document has no Signature element".into()))?;
    let value = descendant_text(&signature, "SignatureValue")
        .ok_or_else(|| TimestampError::InvalidXml("signature has no SignatureValue".into()))?;
    Base64::decode_vec(&value.split_whitespace().collect::<String>())
        .map_err(|_| TimestampError::InvalidXml("SignatureValue is not valid base64".into()))
}

fn signature_imprint(signature_value: &[u8]) -> [u8; 32] {
    Sha256::digest(signature_value).into()
}

/// Simplified timestamp request: version, algorithm id, imprint, random nonce.
fn timestamp_request(imprint: &[u8; 32]) -> Vec<u8> {
    let nonce: [u8; 8] = rand::random();
    let mut request = Vec::with_capacity(1 + SHA256_ALGORITHM_ID.len() + imprint.len() + 8);
    request.push(REQUEST_VERSION);
    request.extend_from_slice(&SHA256_ALGORITHM_ID);
    request.extend_from_slice(imprint);
    request.extend_from_slice(&nonce);
    request
}

/// Validate a TSA reply: the trailing 8 bytes are a big-endian unix timestamp
/// that must be positive and at most [`MAX_FUTURE_SKEW`] in the future. The
/// token is the base64 of the whole reply.
fn parse_timestamp_reply(
    reply: &[u8],
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, String), TimestampError> {
    if reply.len() < 8 {
        return Err(TimestampError::InvalidResponse(format!(
            "reply too short: {} bytes",
            reply.len()
        )));
    }

    let mut seconds_bytes = [0u8; 8];
    seconds_bytes.copy_from_slice(&reply[reply.len() - 8..]);
    let seconds = u64::from_be_bytes(seconds_bytes);
    if seconds == 0 {
        return Err(TimestampError::InvalidResponse(
            "reply carries a zero timestamp".into(),
        ));
    }
    let seconds = i64::try_from(seconds)
        .map_err(|_| TimestampError::InvalidResponse("timestamp out of range".into()))?;
    let time = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| TimestampError::InvalidResponse("timestamp out of range".into()))?;
    if time > now + MAX_FUTURE_SKEW {
        return Err(TimestampError::InvalidResponse(format!(
            "timestamp {} is in the future",
            time.to_rfc3339()
        )));
    }

    Ok((time, Base64::encode_string(reply)))
}

/// Insert the timestamp elements before the closing tag of the first
/// signature's enclosing element.
fn insert_timestamp(
    signed_xml: &str,
    time: DateTime<Utc>,
    token: &str,
) -> Result<String, TimestampError> {
    let block = format!(
        "<ds:SigningTime>{}</ds:SigningTime><ds:TimeStampToken>{}</ds:TimeStampToken>",
        time.to_rfc3339(),
        token
    );

    for close in ["</ds:Signature>", "</Signature>"] {
        if let Some(idx) = signed_xml.find(close) {
            let mut out = String::with_capacity(signed_xml.len() + block.len());
            out.push_str(&signed_xml[..idx]);
            out.push_str(&block);
            out.push_str(&signed_xml[idx..]);
            return Ok(out);
        }
    }
    Err(TimestampError::InvalidXml(
        "no closing Signature tag to anchor the timestamp".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED: &str = concat!(
        r#"<Factura Id="factura-signed-data"><Total>121.00</Total>"#,
        r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#,
        r#"<ds:SignatureValue>c2lnbmF0dXJlLWJ5dGVz</ds:SignatureValue>"#,
        r#"</ds:Signature></Factura>"#
    );

    fn reply_with_time(seconds: u64) -> Vec<u8> {
        let mut reply = b"TSA-REPLY".to_vec();
        reply.extend_from_slice(&seconds.to_be_bytes());
        reply
    }

    #[tokio::test]
    async fn stub_mode_applies_a_fabricated_token() {
        let client = TimestampClient::new(
            TsaConfig::new("https://tsa.invalid/tsr").with_stub(true),
        );
        let outcome = client.add_timestamp(SIGNED).await;
        assert!(outcome.was_applied());
        let xml = outcome.into_xml();
        assert!(xml.contains("<ds:SigningTime>"));
        assert!(xml.contains("<ds:TimeStampToken>"));
        let token_pos = xml.find("<ds:TimeStampToken>").unwrap();
        let close_pos = xml.find("</ds:Signature>").unwrap();
        assert!(token_pos < close_pos);
    }

    #[tokio::test]
    async fn document_without_signature_is_omitted() {
        let client = TimestampClient::new(
            TsaConfig::new("https://tsa.invalid/tsr").with_stub(true),
        );
        let outcome = client.add_timestamp("<Factura><Total>1</Total></Factura>").await;
        match outcome {
            TimestampOutcome::Omitted { xml, reason } => {
                assert_eq!(xml, "<Factura><Total>1</Total></Factura>");
                assert!(reason.contains("no Signature"));
            }
            other => panic!("expected omission, got {other:?}"),
        }
    }

    #[test]
    fn request_framing_is_version_algorithm_imprint_nonce() {
        let imprint = signature_imprint(b"signature-bytes");
        let request = timestamp_request(&imprint);
        assert_eq!(request.len(), 1 + 2 + 32 + 8);
        assert_eq!(request[0], REQUEST_VERSION);
        assert_eq!(&request[1..3], &SHA256_ALGORITHM_ID);
        assert_eq!(&request[3..35], &imprint);
    }

    #[test]
    fn request_nonce_varies_between_requests() {
        let imprint = signature_imprint(b"signature-bytes");
        let a = timestamp_request(&imprint);
        let b = timestamp_request(&imprint);
        assert_ne!(a[35..], b[35..]);
    }

    #[test]
    fn reply_parsing_accepts_recent_times() {
        let now = Utc::now();
        let reply = reply_with_time(now.timestamp() as u64);
        let (time, token) = parse_timestamp_reply(&reply, now).expect("parse");
        assert_eq!(time.timestamp(), now.timestamp());
        assert_eq!(token, Base64::encode_string(&reply));
    }

    #[test]
    fn reply_parsing_rejects_zero_short_and_future_times() {
        let now = Utc::now();
        assert!(matches!(
            parse_timestamp_reply(&reply_with_time(0), now),
            Err(TimestampError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_timestamp_reply(b"abc", now),
            Err(TimestampError::InvalidResponse(_))
        ));
        let future = (now.timestamp() + 120) as u64;
        assert!(matches!(
            parse_timestamp_reply(&reply_with_time(future), now),
            Err(TimestampError::InvalidResponse(_))
        ));
        // Inside the tolerated skew.
        let near_future = (now.timestamp() + 30) as u64;
        assert!(parse_timestamp_reply(&reply_with_time(near_future), now).is_ok());
    }

    #[test]
    fn insertion_anchors_to_unprefixed_signatures_too() {
        let xml = "<Doc><Signature><SignatureValue>AA==</SignatureValue></Signature></Doc>";
        let out = insert_timestamp(xml, Utc::now(), "token").expect("insert");
        let token_pos = out.find("<ds:TimeStampToken>").unwrap();
        let close_pos = out.find("</Signature>").unwrap();
        assert!(token_pos < close_pos);
    }

    #[test]
    fn insertion_lands_in_the_first_of_several_signatures() {
        let xml = concat!(
            r#"<Doc><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#,
            r#"<ds:SignatureValue>AA==</ds:SignatureValue></ds:Signature>"#,
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#,
            r#"<ds:SignatureValue>BB==</ds:SignatureValue></ds:Signature></Doc>"#
        );
        let out = insert_timestamp(xml, Utc::now(), "token").expect("insert");
        let token_pos = out.find("<ds:TimeStampToken>").unwrap();
        let first_close = out.find("</ds:Signature>").unwrap();
        assert!(
            token_pos < first_close,
            "token belongs inside the signature whose value was imprinted"
        );
    }
}
