//! Certificate helpers
//!
//! Thin wrappers over `x509-parser` for the handful of facts the trust map
//! needs: Authority/Subject Key Identifier, subject common name, SHA-256
//! digest of the DER encoding, and issuer signature checks.

use crate::error::CertificateError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use x509_parser::prelude::*;

const PEM_LABEL: &str = "CERTIFICATE";
const PEM_LINE_LEN: usize = 64;
const PEM_BEGIN: &str = "-----BEGIN";

/// Authority Key Identifier in trust map form: lowercase hex octets joined by `-`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AuthorityKeyId(String);

impl AuthorityKeyId {
    pub fn from_bytes(key_id: &[u8]) -> Self {
        let octets: Vec<String> = key_id.iter().map(|b| format!("{:02x}", b)).collect();
        AuthorityKeyId(octets.join("-"))
    }

    /// Normalize a textual key identifier (`AA:BB:CC` becomes `aa-bb-cc`)
    pub fn normalize(text: &str) -> Self {
        AuthorityKeyId(text.trim().replace(':', "-").to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AuthorityKeyId {
    fn from(text: String) -> Self {
        AuthorityKeyId::normalize(&text)
    }
}

impl From<AuthorityKeyId> for String {
    fn from(aki: AuthorityKeyId) -> Self {
        aki.0
    }
}

impl fmt::Display for AuthorityKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 digest of a certificate's DER encoding, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CertificateDigest(String);

impl CertificateDigest {
    pub fn sha256(data: &[u8]) -> Self {
        CertificateDigest(to_hex(&Sha256::digest(data)))
    }

    pub fn from_bytes(digest: &[u8]) -> Self {
        CertificateDigest(to_hex(digest))
    }

    pub fn normalize(text: &str) -> Self {
        CertificateDigest(text.trim().replace([':', '-'], "").to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CertificateDigest {
    fn from(text: String) -> Self {
        CertificateDigest::normalize(&text)
    }
}

impl From<CertificateDigest> for String {
    fn from(digest: CertificateDigest) -> Self {
        digest.0
    }
}

impl fmt::Display for CertificateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An X.509 certificate held as DER
///
/// Ordering and equality are by encoding, so a set of certificates is
/// deduplicated by content.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Decode the first CERTIFICATE block of a PEM document
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
            .map_err(|e| CertificateError::Pem(e.to_string()))?;
        if pem.label != PEM_LABEL {
            return Err(CertificateError::Pem(format!(
                "unexpected PEM label '{}'",
                pem.label
            )));
        }
        Self::from_der(pem.contents)
    }

    /// Decode a certificate file's contents, PEM or DER
    pub fn from_pem_or_der(data: &[u8]) -> Result<Self, CertificateError> {
        match std::str::from_utf8(data) {
            Ok(text) if text.contains(PEM_BEGIN) => Self::from_pem(text),
            _ => Self::from_der(data.to_vec()),
        }
    }

    /// Wrap DER bytes, checking that they parse
    pub fn from_der(der: Vec<u8>) -> Result<Self, CertificateError> {
        parse_x509_certificate(&der).map_err(|e| CertificateError::Der(e.to_string()))?;
        Ok(Certificate { der })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Standard PEM encoding with 64-column base64 lines
    pub fn to_pem(&self) -> String {
        let encoded = STANDARD.encode(&self.der);
        let mut pem = format!("-----BEGIN {}-----\n", PEM_LABEL);
        for chunk in encoded.as_bytes().chunks(PEM_LINE_LEN) {
            // base64 output is ASCII
            pem.push_str(&String::from_utf8_lossy(chunk));
            pem.push('\n');
        }
        pem.push_str(&format!("-----END {}-----\n", PEM_LABEL));
        pem
    }

    /// Authority Key Identifier extension, normalized
    pub fn authority_key_id(&self) -> Result<AuthorityKeyId, CertificateError> {
        self.with_parsed(|cert| {
            cert.extensions()
                .iter()
                .find_map(|ext| match ext.parsed_extension() {
                    ParsedExtension::AuthorityKeyIdentifier(aki) => aki
                        .key_identifier
                        .as_ref()
                        .map(|key_id| AuthorityKeyId::from_bytes(key_id.0)),
                    _ => None,
                })
                .ok_or(CertificateError::MissingAuthorityKeyId)
        })
    }

    /// Subject Key Identifier extension in the same form as an AKI
    pub fn subject_key_id(&self) -> Result<Option<AuthorityKeyId>, CertificateError> {
        self.with_parsed(|cert| {
            Ok(cert
                .extensions()
                .iter()
                .find_map(|ext| match ext.parsed_extension() {
                    ParsedExtension::SubjectKeyIdentifier(key_id) => {
                        Some(AuthorityKeyId::from_bytes(key_id.0))
                    }
                    _ => None,
                }))
        })
    }

    /// First subject commonName
    pub fn common_name(&self) -> Result<String, CertificateError> {
        self.with_parsed(|cert| {
            cert.subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string)
                .ok_or(CertificateError::MissingCommonName)
        })
    }

    /// SHA-256 over the full DER certificate
    pub fn sha256(&self) -> CertificateDigest {
        CertificateDigest::sha256(&self.der)
    }

    pub fn sha256_bytes(&self) -> Vec<u8> {
        Sha256::digest(&self.der).to_vec()
    }

    /// Current time falls inside notBefore..notAfter
    pub fn is_time_valid(&self) -> Result<bool, CertificateError> {
        self.with_parsed(|cert| Ok(cert.validity().is_valid()))
    }

    /// Subject and issuer names are identical
    pub fn is_self_issued(&self) -> Result<bool, CertificateError> {
        self.with_parsed(|cert| Ok(cert.subject() == cert.issuer()))
    }

    /// Check this certificate's signature with `issuer`'s public key
    pub fn verify_issued_by(&self, issuer: &Certificate) -> Result<(), CertificateError> {
        let (_, issuer_cert) = parse_x509_certificate(&issuer.der)
            .map_err(|e| CertificateError::Der(e.to_string()))?;
        self.with_parsed(|cert| {
            cert.verify_signature(Some(issuer_cert.public_key()))
                .map_err(|e| CertificateError::InvalidSignature(e.to_string()))
        })
    }

    fn with_parsed<T>(
        &self,
        f: impl FnOnce(&X509Certificate<'_>) -> Result<T, CertificateError>,
    ) -> Result<T, CertificateError> {
        let (_, cert) =
            parse_x509_certificate(&self.der).map_err(|e| CertificateError::Der(e.to_string()))?;
        f(&cert)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("sha256", &self.sha256().as_str())
            .finish()
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
