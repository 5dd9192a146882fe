//! Signing-identity loading and validation.
//!
//! Identities come from PKCS#12 bundles (the format AEAT issues) or from
//! PEM certificate/key pairs. Loaded identities are cached per store instance
//! with a bounded TTL so repeated submissions do not re-read and re-parse the
//! keystore.
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::Decode;
use x509_cert::ext::pkix::KeyUsage;
use x509_cert::Certificate;

const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Error)]
enum LoadError {
    #[error("failed to read keystore: {0}")]
    Io(#[from] std::io::Error),
    #[error("keystore error: {0}")]
    Keystore(String),
    #[error("certificate parse error: {0}")]
    CertParse(String),
}

/// A loaded signing identity: the private key, its certificate, and the
/// certificate metadata needed for validation and mutual TLS.
#[derive(Debug, Clone)]
pub struct SigningIdentity {
    private_key_pem: String,
    certificate_pem: String,
    public_key_pem: String,
    issuer: String,
    subject: String,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    has_digital_signature_usage: Option<bool>,
    // Original PKCS#12 material, kept for the TLS client identity.
    pkcs12: Option<(Vec<u8>, String)>,
}

impl SigningIdentity {
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    pub fn valid_to(&self) -> DateTime<Utc> {
        self.valid_to
    }

    /// PKCS#12 DER and password, present when the identity was loaded from a
    /// PKCS#12 bundle.
    pub fn pkcs12_der(&self) -> Option<(&[u8], &str)> {
        self.pkcs12
            .as_ref()
            .map(|(der, password)| (der.as_slice(), password.as_str()))
    }
}

/// Result of [`CertificateStore::validate_certificate`]. `errors` is empty iff
/// `valid` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Loads, caches, and validates signing identities.
///
/// Load failures never cross this boundary as errors: both loaders return
/// `None` and log the cause, matching callers that treat a missing identity
/// as "submission not possible" rather than a crash.
#[derive(Debug)]
pub struct CertificateStore {
    cache: Mutex<HashMap<String, (Instant, Arc<SigningIdentity>)>>,
    ttl: Duration,
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateStore {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    /// Override the cache lifetime. Entries older than the TTL are reloaded
    /// from disk on the next lookup.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Load an identity from a PKCS#12 bundle. Cached for one hour, keyed by
    /// path and password.
    pub fn load_from_p12(&self, path: &Path, password: &str) -> Option<Arc<SigningIdentity>> {
        self.load_cached(path, password, |p, pw| load_p12_identity(p, pw))
    }

    /// Load an identity from a PEM certificate and a PEM PKCS#8 private key.
    pub fn load_from_pem(&self, cert_path: &Path, key_path: &Path) -> Option<Arc<SigningIdentity>> {
        let key_name = key_path.to_string_lossy().into_owned();
        self.load_cached(cert_path, &key_name, |cert, _| {
            load_pem_identity(cert, key_path)
        })
    }

    /// Check the certificate's validity window and key usage.
    ///
    /// A certificate without a KeyUsage extension passes the usage check; one
    /// with the extension must assert `digitalSignature`.
    pub fn validate_certificate(&self, identity: &SigningIdentity) -> CertValidation {
        let mut errors = Vec::new();
        let now = Utc::now();

        if now < identity.valid_from {
            errors.push(format!(
                "certificate is not yet valid (valid from {})",
                identity.valid_from.to_rfc3339()
            ));
        }
        if now > identity.valid_to {
            errors.push(format!(
                "certificate expired on {}",
                identity.valid_to.to_rfc3339()
            ));
        }
        if identity.has_digital_signature_usage == Some(false) {
            errors.push("certificate key usage does not permit digitalSignature".to_string());
        }

        CertValidation {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Drop every cached identity. The next load re-reads the keystore.
    pub fn clear_cache(&self) {
        self.cache.lock().expect("cert cache poisoned").clear();
    }

    /// Human-readable certificate details for diagnostics.
    pub fn identity_summary(&self, identity: &SigningIdentity) -> String {
        let validation = self.validate_certificate(identity);
        let mut out = String::new();
        let _ = writeln!(out, "subject:    {}", identity.subject);
        let _ = writeln!(out, "issuer:     {}", identity.issuer);
        let _ = writeln!(out, "valid from: {}", identity.valid_from.to_rfc3339());
        let _ = writeln!(out, "valid to:   {}", identity.valid_to.to_rfc3339());
        let _ = write!(out, "status:     ");
        if validation.valid {
            let _ = write!(out, "valid");
        } else {
            let _ = write!(out, "INVALID ({})", validation.errors.join("; "));
        }
        out
    }

    fn load_cached(
        &self,
        path: &Path,
        secret: &str,
        load: impl FnOnce(&Path, &str) -> Result<SigningIdentity, LoadError>,
    ) -> Option<Arc<SigningIdentity>> {
        let key = cache_key(path, secret);
        // Held across the miss so concurrent callers load the keystore once.
        let mut cache = self.cache.lock().expect("cert cache poisoned");

        if let Some((loaded_at, identity)) = cache.get(&key) {
            if loaded_at.elapsed() < self.ttl {
                debug!(target: "sii::cert", path = %path.display(), "identity served from cache");
                return Some(Arc::clone(identity));
            }
            cache.remove(&key);
        }

        match load(path, secret) {
            Ok(identity) => {
                let identity = Arc::new(identity);
                cache.insert(key, (Instant::now(), Arc::clone(&identity)));
                debug!(
                    target: "sii::cert",
                    path = %path.display(),
                    subject = %identity.subject,
                    "identity loaded",
                );
                Some(identity)
            }
            Err(err) => {
                warn!(
                    target: "sii::cert",
                    path = %path.display(),
                    "failed to load signing identity: {err}",
                );
                None
            }
        }
    }
}

fn cache_key(path: &Path, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

fn load_p12_identity(path: &Path, password: &str) -> Result<SigningIdentity, LoadError> {
    let der = std::fs::read(path)?;
    let parsed = Pkcs12::from_der(&der)
        .map_err(|e| LoadError::Keystore(e.to_string()))?
        .parse2(password)
        .map_err(|e| LoadError::Keystore(e.to_string()))?;

    let cert = parsed
        .cert
        .ok_or_else(|| LoadError::Keystore("bundle contains no certificate".into()))?;
    let key = parsed
        .pkey
        .ok_or_else(|| LoadError::Keystore("bundle contains no private key".into()))?;

    build_identity(&cert, &key, Some((der, password.to_string())))
}

fn load_pem_identity(cert_path: &Path, key_path: &Path) -> Result<SigningIdentity, LoadError> {
    let cert_pem = std::fs::read(cert_path)?;
    let key_pem = std::fs::read(key_path)?;

    let cert = X509::from_pem(&cert_pem).map_err(|e| LoadError::CertParse(e.to_string()))?;
    let key =
        PKey::private_key_from_pem(&key_pem).map_err(|e| LoadError::Keystore(e.to_string()))?;

    build_identity(&cert, &key, None)
}

fn build_identity(
    cert: &X509,
    key: &PKey<Private>,
    pkcs12: Option<(Vec<u8>, String)>,
) -> Result<SigningIdentity, LoadError> {
    let cert_der = cert.to_der().map_err(|e| LoadError::CertParse(e.to_string()))?;
    let parsed = Certificate::from_der(&cert_der)
        .map_err(|e| LoadError::CertParse(format!("{e:?}")))?;

    let certificate_pem = String::from_utf8(
        cert.to_pem().map_err(|e| LoadError::CertParse(e.to_string()))?,
    )
    .map_err(|e| LoadError::CertParse(e.to_string()))?;
    let private_key_pem = String::from_utf8(
        key.private_key_to_pem_pkcs8()
            .map_err(|e| LoadError::Keystore(e.to_string()))?,
    )
    .map_err(|e| LoadError::Keystore(e.to_string()))?;
    let public_key_pem = String::from_utf8(
        key.public_key_to_pem()
            .map_err(|e| LoadError::Keystore(e.to_string()))?,
    )
    .map_err(|e| LoadError::Keystore(e.to_string()))?;

    let validity = &parsed.tbs_certificate.validity;
    let valid_from = DateTime::<Utc>::from(validity.not_before.to_system_time());
    let valid_to = DateTime::<Utc>::from(validity.not_after.to_system_time());

    Ok(SigningIdentity {
        private_key_pem,
        certificate_pem,
        public_key_pem,
        issuer: parsed.tbs_certificate.issuer.to_string(),
        subject: parsed.tbs_certificate.subject.to_string(),
        valid_from,
        valid_to,
        has_digital_signature_usage: digital_signature_usage(&parsed),
        pkcs12,
    })
}

/// `None` when the certificate carries no KeyUsage extension.
fn digital_signature_usage(cert: &Certificate) -> Option<bool> {
    let extensions = cert.tbs_certificate.extensions.as_ref()?;
    for extension in extensions {
        if extension.extn_id == KeyUsage::OID {
            return match KeyUsage::from_der(extension.extn_value.as_bytes()) {
                Ok(usage) => Some(usage.digital_signature()),
                Err(_) => Some(false),
            };
        }
    }
    None
}
