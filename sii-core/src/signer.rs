//! Enveloped XML digital signatures (XML-DSig) over arbitrary documents.
//!
//! Signing canonicalizes the document with every existing `Signature` subtree
//! removed, so re-signing an already-signed document yields a second signature
//! over the same content and never invalidates the first. The `SignedInfo`
//! element carries its own `xmlns:ds` declaration, which keeps its serialized
//! form self-contained: verification re-canonicalizes the exact `SignedInfo`
//! bytes present in the document.
use base64ct::{Base64, Encoding};
use libxml::parser::Parser;
use libxml::tree::{c14n, Document, Node};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::xml::{descendant_text, find_descendants};

const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
const C14N11_URI: &str = "http://www.w3.org/2006/12/xml-c14n11";
const ENVELOPED_URI: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
const RSA_SHA256_URI: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
const RSA_SHA1_URI: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
const SHA256_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const SHA1_URI: &str = "http://www.w3.org/2000/09/xmldsig#sha1";

/// Minimum RSA modulus size that verifies without a weak-key warning.
const MIN_RSA_BITS: u32 = 2048;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("malformed XML: {0}")]
    MalformedXml(String),
    #[error("signature algorithm not allowed: {0}")]
    DisallowedAlgorithm(String),
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),
    #[error("document contains no Signature element")]
    MissingSignature,
    #[error("signature contains no X509Certificate element")]
    MissingCertificate,
}

/// Supported signature algorithms. SHA-1 verifies with a warning and is never
/// offered for signing by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaSha256,
    RsaSha1,
}

impl SignatureAlgorithm {
    pub fn uri(self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaSha256 => RSA_SHA256_URI,
            SignatureAlgorithm::RsaSha1 => RSA_SHA1_URI,
        }
    }

    pub fn digest_uri(self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaSha256 => SHA256_URI,
            SignatureAlgorithm::RsaSha1 => SHA1_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            RSA_SHA256_URI => Some(SignatureAlgorithm::RsaSha256),
            RSA_SHA1_URI => Some(SignatureAlgorithm::RsaSha1),
            _ => None,
        }
    }

    fn message_digest(self) -> MessageDigest {
        match self {
            SignatureAlgorithm::RsaSha256 => MessageDigest::sha256(),
            SignatureAlgorithm::RsaSha1 => MessageDigest::sha1(),
        }
    }
}

/// Signing and verification policy.
#[derive(Debug, Clone)]
pub struct SignerOptions {
    /// Reject, before any cryptography, algorithms outside `allowed_algorithms`.
    pub strict_validation: bool,
    pub allowed_algorithms: Vec<SignatureAlgorithm>,
    /// Embed the signing certificate in a `KeyInfo` block.
    pub include_key_info: bool,
    pub signature_algorithm: SignatureAlgorithm,
}

impl Default for SignerOptions {
    fn default() -> Self {
        Self {
            strict_validation: true,
            allowed_algorithms: vec![SignatureAlgorithm::RsaSha256],
            include_key_info: true,
            signature_algorithm: SignatureAlgorithm::RsaSha256,
        }
    }
}

/// Outcome of [`XmlSigner::verify`]. `valid` is true iff `errors` is empty;
/// `warnings` flag weak cryptography without failing verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Produces and verifies enveloped XML-DSig signatures.
#[derive(Debug, Default)]
pub struct XmlSigner {
    options: SignerOptions,
}

impl XmlSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SignerOptions) -> Self {
        Self { options }
    }

    /// Sign `xml` with an enveloped signature appended as the last child of
    /// the document root.
    ///
    /// The reference `Id` on the root is synthesized deterministically from
    /// the root's local name (`Factura` becomes `factura-signed-data`), so
    /// repeated signing of the same document targets the same `Id`. An `Id`
    /// already present on the root is reused untouched.
    ///
    /// # Errors
    /// [`SignatureError`] for malformed XML, a configured algorithm outside
    /// the allow-list, or key/crypto failures.
    pub fn sign(
        &self,
        xml: &str,
        private_key_pem: &str,
        certificate_pem: &str,
    ) -> Result<String, SignatureError> {
        let algorithm = self.options.signature_algorithm;
        if self.options.strict_validation
            && !self.options.allowed_algorithms.contains(&algorithm)
        {
            return Err(SignatureError::DisallowedAlgorithm(
                algorithm.uri().to_string(),
            ));
        }

        let mut doc = Parser::default()
            .parse_string(xml)
            .map_err(|e| SignatureError::MalformedXml(format!("{e:?}")))?;
        let mut root = doc
            .get_root_element()
            .ok_or_else(|| SignatureError::MalformedXml("empty document".into()))?;

        let reference_id = match root.get_attribute("Id") {
            Some(existing) => existing,
            None => {
                let id = synthesize_id(&root);
                root.set_attribute("Id", &id)
                    .map_err(|e| SignatureError::MalformedXml(e.to_string()))?;
                id
            }
        };

        let digest_b64 = document_digest_base64(&doc, algorithm)?;
        let signed_info = signed_info_xml(algorithm, &reference_id, &digest_b64);
        let canonical_signed_info = canonicalize_fragment(&signed_info)?;

        let key = PKey::private_key_from_pem(private_key_pem.as_bytes())
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        let mut signer = Signer::new(algorithm.message_digest(), &key)
            .map_err(|e| SignatureError::Crypto(e.to_string()))?;
        let signature = signer
            .sign_oneshot_to_vec(canonical_signed_info.as_bytes())
            .map_err(|e| SignatureError::Crypto(e.to_string()))?;
        let signature_b64 = Base64::encode_string(&signature);

        let key_info = if self.options.include_key_info {
            format!(
                "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                pem_body(certificate_pem)
            )
        } else {
            String::new()
        };

        let signature_xml = format!(
            r#"<ds:Signature xmlns:ds="{DS_NS}">{signed_info}<ds:SignatureValue>{signature_b64}</ds:SignatureValue>{key_info}</ds:Signature>"#
        );

        let mut signature_node = import_fragment(&mut doc, &signature_xml)?;
        root.add_child(&mut signature_node)
            .map_err(|e| SignatureError::MalformedXml(e.to_string()))?;

        debug!(target: "sii::signer", reference_id, "document signed");
        Ok(doc.to_string())
    }

    /// Verify every signature in `signed_xml`.
    ///
    /// The report aggregates across signatures: any failing signature makes
    /// the whole report invalid. SHA-1 and RSA keys shorter than 2048 bits
    /// verify but produce warnings.
    ///
    /// # Errors
    /// Only [`SignatureError::MalformedXml`]; verification findings are
    /// reported, not raised.
    pub fn verify(&self, signed_xml: &str) -> Result<VerificationReport, SignatureError> {
        let doc = Parser::default()
            .parse_string(signed_xml)
            .map_err(|e| SignatureError::MalformedXml(format!("{e:?}")))?;
        let root = doc
            .get_root_element()
            .ok_or_else(|| SignatureError::MalformedXml("empty document".into()))?;

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let signatures = find_descendants(&root, "Signature");
        if signatures.is_empty() {
            errors.push("document contains no Signature element".to_string());
            return Ok(VerificationReport {
                valid: false,
                errors,
                warnings,
            });
        }

        let signed_info_slices = signed_info_slices(signed_xml);

        for (index, signature) in signatures.iter().enumerate() {
            let label = format!("signature {}", index + 1);
            self.verify_one(
                &doc,
                signature,
                signed_info_slices.get(index).map(String::as_str),
                &label,
                &mut errors,
                &mut warnings,
            );
        }

        Ok(VerificationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        })
    }

    fn verify_one(
        &self,
        doc: &Document,
        signature: &Node,
        signed_info_raw: Option<&str>,
        label: &str,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        let algorithm_uri = find_descendants(signature, "SignatureMethod")
            .first()
            .and_then(|n| n.get_attribute("Algorithm"))
            .unwrap_or_default();
        let Some(algorithm) = SignatureAlgorithm::from_uri(&algorithm_uri) else {
            errors.push(format!("{label}: unsupported algorithm '{algorithm_uri}'"));
            return;
        };
        if self.options.strict_validation
            && !self.options.allowed_algorithms.contains(&algorithm)
        {
            errors.push(format!("{label}: algorithm not allowed: {algorithm_uri}"));
            return;
        }
        if algorithm == SignatureAlgorithm::RsaSha1 {
            warnings.push(format!("{label}: SHA-1 based signature is weak"));
        }

        let Some(digest_b64) = descendant_text(signature, "DigestValue") else {
            errors.push(format!("{label}: missing DigestValue"));
            return;
        };
        let Some(signature_b64) = descendant_text(signature, "SignatureValue") else {
            errors.push(format!("{label}: missing SignatureValue"));
            return;
        };
        let Some(cert_b64) = descendant_text(signature, "X509Certificate") else {
            errors.push(format!("{label}: no embedded certificate to verify against"));
            return;
        };

        let reference_uri = find_descendants(signature, "Reference")
            .first()
            .and_then(|n| n.get_attribute("URI"))
            .unwrap_or_default();
        let root_id = doc
            .get_root_element()
            .and_then(|root| root.get_attribute("Id"))
            .unwrap_or_default();
        if reference_uri.strip_prefix('#') != Some(root_id.as_str()) {
            errors.push(format!(
                "{label}: reference URI '{reference_uri}' does not resolve to the document Id '{root_id}'"
            ));
            return;
        }

        let expected_digest = match document_digest_base64(doc, algorithm) {
            Ok(digest) => digest,
            Err(err) => {
                errors.push(format!("{label}: {err}"));
                return;
            }
        };
        if expected_digest != digest_b64 {
            errors.push(format!("{label}: digest mismatch, document was modified"));
            return;
        }

        let Some(signed_info_raw) = signed_info_raw else {
            errors.push(format!("{label}: SignedInfo not found"));
            return;
        };
        let canonical_signed_info = match canonicalize_fragment(signed_info_raw) {
            Ok(canonical) => canonical,
            Err(err) => {
                errors.push(format!("{label}: {err}"));
                return;
            }
        };

        let cert_der = match Base64::decode_vec(&cert_b64.split_whitespace().collect::<String>()) {
            Ok(der) => der,
            Err(_) => {
                errors.push(format!("{label}: X509Certificate is not valid base64"));
                return;
            }
        };
        let cert = match X509::from_der(&cert_der) {
            Ok(cert) => cert,
            Err(e) => {
                errors.push(format!("{label}: certificate parse error: {e}"));
                return;
            }
        };
        let public_key = match cert.public_key() {
            Ok(key) => key,
            Err(e) => {
                errors.push(format!("{label}: certificate public key error: {e}"));
                return;
            }
        };
        if public_key.bits() < MIN_RSA_BITS {
            warnings.push(format!(
                "{label}: {}-bit key is below {MIN_RSA_BITS} bits",
                public_key.bits()
            ));
        }

        let signature_bytes =
            match Base64::decode_vec(&signature_b64.split_whitespace().collect::<String>()) {
                Ok(bytes) => bytes,
                Err(_) => {
                    errors.push(format!("{label}: SignatureValue is not valid base64"));
                    return;
                }
            };

        let verified = Verifier::new(algorithm.message_digest(), &public_key)
            .and_then(|mut v| v.verify_oneshot(&signature_bytes, canonical_signed_info.as_bytes()));
        match verified {
            Ok(true) => {}
            Ok(false) => errors.push(format!("{label}: signature value does not verify")),
            Err(e) => errors.push(format!("{label}: verification error: {e}")),
        }
    }

    /// Extract the first embedded certificate, re-armored as PEM.
    ///
    /// # Errors
    /// [`SignatureError::MissingSignature`] / [`SignatureError::MissingCertificate`]
    /// when the document has no signature or no embedded certificate.
    pub fn extract_certificate_from_signature(
        &self,
        signed_xml: &str,
    ) -> Result<String, SignatureError> {
        let doc = Parser::default()
            .parse_string(signed_xml)
            .map_err(|e| SignatureError::MalformedXml(format!("{e:?}")))?;
        let root = doc
            .get_root_element()
            .ok_or_else(|| SignatureError::MalformedXml("empty document".into()))?;

        let signature = find_descendants(&root, "Signature")
            .into_iter()
            .next()
            .ok_or(SignatureError::MissingSignature)?;
        let cert_b64 = descendant_text(&signature, "X509Certificate")
            .ok_or(SignatureError::MissingCertificate)?;
        let body: String = cert_b64.split_whitespace().collect();

        let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
        for chunk in body.as_bytes().chunks(64) {
            pem.push_str(std::str::from_utf8(chunk).map_err(|_| {
                SignatureError::MalformedXml("certificate content is not ASCII".into())
            })?);
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
        Ok(pem)
    }
}

/// Deterministic reference id: lowercased root local name plus `-signed-data`.
fn synthesize_id(root: &Node) -> String {
    let name = root.get_name();
    let local = name.rsplit(':').next().unwrap_or(&name);
    format!("{}-signed-data", local.to_lowercase())
}

/// Canonical digest of the document with every `Signature` subtree removed.
fn document_digest_base64(
    doc: &Document,
    algorithm: SignatureAlgorithm,
) -> Result<String, SignatureError> {
    let copy = doc
        .dup()
        .map_err(|e| SignatureError::MalformedXml(format!("failed to duplicate xml: {e:?}")))?;
    if let Some(root) = copy.get_root_element() {
        for mut node in find_descendants(&root, "Signature") {
            node.unlink();
        }
    }

    let opts = c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::Canonical1_1,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    };
    let canonical = copy
        .canonicalize(opts, None)
        .map_err(|e| SignatureError::MalformedXml(format!("canonicalization failed: {e:?}")))?;

    let digest = match algorithm {
        SignatureAlgorithm::RsaSha256 => Sha256::digest(canonical.as_bytes()).to_vec(),
        SignatureAlgorithm::RsaSha1 => {
            openssl::hash::hash(MessageDigest::sha1(), canonical.as_bytes())
                .map_err(|e| SignatureError::Crypto(e.to_string()))?
                .to_vec()
        }
    };
    Ok(Base64::encode_string(&digest))
}

/// Canonicalize a self-contained XML fragment.
fn canonicalize_fragment(fragment: &str) -> Result<String, SignatureError> {
    let doc = Parser::default()
        .parse_string(fragment)
        .map_err(|e| SignatureError::MalformedXml(format!("{e:?}")))?;
    let opts = c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::Canonical1_1,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    };
    doc.canonicalize(opts, None)
        .map_err(|e| SignatureError::MalformedXml(format!("canonicalization failed: {e:?}")))
}

fn signed_info_xml(algorithm: SignatureAlgorithm, reference_id: &str, digest_b64: &str) -> String {
    format!(
        r##"<ds:SignedInfo xmlns:ds="{DS_NS}"><ds:CanonicalizationMethod Algorithm="{C14N11_URI}"/><ds:SignatureMethod Algorithm="{sig}"/><ds:Reference URI="#{reference_id}"><ds:Transforms><ds:Transform Algorithm="{ENVELOPED_URI}"/><ds:Transform Algorithm="{C14N11_URI}"/></ds:Transforms><ds:DigestMethod Algorithm="{digest}"/><ds:DigestValue>{digest_b64}</ds:DigestValue></ds:Reference></ds:SignedInfo>"##,
        sig = algorithm.uri(),
        digest = algorithm.digest_uri(),
    )
}

/// Raw `SignedInfo` slices in document order. The signer always declares
/// `xmlns:ds` on `SignedInfo` itself, so each slice is self-contained.
fn signed_info_slices(xml: &str) -> Vec<String> {
    let mut slices = Vec::new();
    for (open, close) in [
        ("<ds:SignedInfo", "</ds:SignedInfo>"),
        ("<SignedInfo", "</SignedInfo>"),
    ] {
        let mut cursor = 0;
        while let Some(start) = xml[cursor..].find(open) {
            let start = cursor + start;
            let Some(end) = xml[start..].find(close) else {
                break;
            };
            let end = start + end + close.len();
            slices.push(xml[start..end].to_string());
            cursor = end;
        }
        if !slices.is_empty() {
            break;
        }
    }
    slices
}

fn import_fragment(doc: &mut Document, xml: &str) -> Result<Node, SignatureError> {
    let fragment = Parser::default()
        .parse_string(xml)
        .map_err(|e| SignatureError::MalformedXml(format!("{e:?}")))?;
    let mut node = fragment
        .get_root_element()
        .ok_or_else(|| SignatureError::MalformedXml("missing fragment root".into()))?;
    node.unlink();
    doc.import_node(&mut node)
        .map_err(|_| SignatureError::MalformedXml("failed to import fragment".into()))
}

/// Base64 body of a PEM blob, armor and line breaks stripped.
fn pem_body(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/certs")
            .join(name);
        std::fs::read_to_string(path).expect("read fixture")
    }

    const SAMPLE: &str =
        r#"<?xml version="1.0" encoding="UTF-8"?><Factura><Numero>FAC-1</Numero><Total>121.00</Total></Factura>"#;

    #[test]
    fn sign_then_verify_roundtrip() {
        let signer = XmlSigner::new();
        let signed = signer
            .sign(SAMPLE, &fixture("company.key"), &fixture("company.crt"))
            .expect("sign");
        assert!(signed.contains("<ds:Signature"));
        assert!(signed.contains(r##"URI="#factura-signed-data""##));

        let report = signer.verify(&signed).expect("verify");
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    }

    #[test]
    fn tampered_content_fails_verification() {
        let signer = XmlSigner::new();
        let signed = signer
            .sign(SAMPLE, &fixture("company.key"), &fixture("company.crt"))
            .expect("sign");
        let tampered = signed.replace("121.00", "999.00");

        let report = signer.verify(&tampered).expect("verify");
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("digest mismatch")));
    }

    #[test]
    fn reference_id_is_stable_across_signings() {
        let signer = XmlSigner::new();
        let once = signer
            .sign(SAMPLE, &fixture("company.key"), &fixture("company.crt"))
            .expect("sign");
        let twice = signer
            .sign(&once, &fixture("company.key"), &fixture("company.crt"))
            .expect("re-sign");

        assert_eq!(once.matches("Id=\"factura-signed-data\"").count(), 1);
        assert_eq!(twice.matches("Id=\"factura-signed-data\"").count(), 1);
        assert_eq!(twice.matches("<ds:Signature").count(), 2);

        let report = signer.verify(&twice).expect("verify");
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn dangling_reference_uri_fails_verification() {
        let signer = XmlSigner::new();
        let signed = signer
            .sign(SAMPLE, &fixture("company.key"), &fixture("company.crt"))
            .expect("sign");
        let rewired = signed.replace("URI=\"#factura-signed-data\"", "URI=\"#somewhere-else\"");

        let report = signer.verify(&rewired).expect("verify");
        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("does not resolve")));
    }

    #[test]
    fn unsigned_document_reports_missing_signature() {
        let report = XmlSigner::new().verify(SAMPLE).expect("verify");
        assert!(!report.valid);
        assert!(report.errors[0].contains("no Signature"));
    }

    #[test]
    fn malformed_xml_is_rejected_synchronously() {
        let signer = XmlSigner::new();
        let err = signer
            .sign("<open>", &fixture("company.key"), &fixture("company.crt"))
            .unwrap_err();
        assert!(matches!(err, SignatureError::MalformedXml(_)));
        let err = signer.verify("not xml at all").unwrap_err();
        assert!(matches!(err, SignatureError::MalformedXml(_)));
    }

    #[test]
    fn strict_mode_rejects_disallowed_signing_algorithm() {
        let signer = XmlSigner::with_options(SignerOptions {
            signature_algorithm: SignatureAlgorithm::RsaSha1,
            ..SignerOptions::default()
        });
        let err = signer
            .sign(SAMPLE, &fixture("company.key"), &fixture("company.crt"))
            .unwrap_err();
        assert!(matches!(err, SignatureError::DisallowedAlgorithm(_)));
    }

    #[test]
    fn sha1_signature_verifies_with_warning_when_allowed() {
        let permissive = SignerOptions {
            strict_validation: false,
            allowed_algorithms: vec![SignatureAlgorithm::RsaSha256, SignatureAlgorithm::RsaSha1],
            include_key_info: true,
            signature_algorithm: SignatureAlgorithm::RsaSha1,
        };
        let signer = XmlSigner::with_options(permissive);
        let signed = signer
            .sign(SAMPLE, &fixture("company.key"), &fixture("company.crt"))
            .expect("sign");

        let report = signer.verify(&signed).expect("verify");
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.warnings.iter().any(|w| w.contains("SHA-1")));
    }

    #[test]
    fn extracts_embedded_certificate_as_pem() {
        let signer = XmlSigner::new();
        let signed = signer
            .sign(SAMPLE, &fixture("company.key"), &fixture("company.crt"))
            .expect("sign");
        let pem = signer
            .extract_certificate_from_signature(&signed)
            .expect("extract");
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.trim_end().ends_with("-----END CERTIFICATE-----"));
        assert_eq!(pem_body(&pem), pem_body(&fixture("company.crt")));
    }

    #[test]
    fn missing_key_info_makes_signature_unverifiable() {
        let signer = XmlSigner::with_options(SignerOptions {
            include_key_info: false,
            ..SignerOptions::default()
        });
        let signed = signer
            .sign(SAMPLE, &fixture("company.key"), &fixture("company.crt"))
            .expect("sign");
        let report = signer.verify(&signed).expect("verify");
        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("no embedded certificate")));
        let err = signer.extract_certificate_from_signature(&signed).unwrap_err();
        assert!(matches!(err, SignatureError::MissingCertificate));
    }

    #[test]
    fn id_synthesis_lowercases_local_name() {
        let doc = Parser::default()
            .parse_string("<ns:FacturaElectronica xmlns:ns=\"urn:x\"/>")
            .expect("parse");
        let root = doc.get_root_element().expect("root");
        assert_eq!(synthesize_id(&root), "facturaelectronica-signed-data");
    }
}
