//! Rust toolkit for submitting electronic invoices to the Spanish tax agency's
//! SII (Suministro Inmediato de Información) near-real-time reporting service.
//!
//! The crate covers the document-trust pipeline end to end: loading a signing
//! identity from PKCS#12 or PEM sources ([`cert`]), producing and verifying
//! enveloped XML digital signatures ([`signer`]), obtaining RFC 3161-style
//! timestamps ([`timestamp`]), and the SOAP submission pipeline with retry and
//! mutual TLS ([`api`]).
//!
//! # Examples
//! ```rust
//! use sii_core::config::SiiConfig;
//!
//! let config = SiiConfig::new("B12345678", "certs/company.p12", "secret")?;
//! # let _ = config;
//! # Ok::<(), sii_core::config::ConfigError>(())
//! ```
pub mod api;
pub mod cert;
pub mod config;
pub mod invoice;
pub mod retry;
pub mod signer;
pub mod soap;
pub mod timestamp;
pub mod transform;
pub mod xml;

use thiserror::Error;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Signature(#[from] signer::SignatureError),
    #[error(transparent)]
    Timestamp(#[from] timestamp::TimestampError),
    #[error(transparent)]
    Response(#[from] soap::ResponseParseError),
    #[error(transparent)]
    Sii(#[from] api::SiiError),
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::api::SiiError;
    use crate::config::ConfigError;
    use crate::signer::SignatureError;
    use crate::soap::ResponseParseError;
    use crate::timestamp::TimestampError;

    #[test]
    fn error_conversions_cover_variants() {
        let err: Error = ConfigError::Missing { field: "nif" }.into();
        assert!(matches!(err, Error::Config(_)));

        let err: Error = SignatureError::MalformedXml("bad".into()).into();
        assert!(matches!(err, Error::Signature(_)));

        let err: Error = TimestampError::TsaUnavailable("down".into()).into();
        assert!(matches!(err, Error::Timestamp(_)));

        let err: Error = ResponseParseError::MissingRegistration.into();
        assert!(matches!(err, Error::Response(_)));

        let err: Error = SiiError::ClientState("state".into()).into();
        assert!(matches!(err, Error::Sii(_)));
    }
}
