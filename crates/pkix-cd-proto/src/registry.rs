//! Revocation registry check
//!
//! Certificates whose subject CN sits under a registry domain (for example
//! `air-sensor.iotregistry.ca`) must prove they are still registered: the
//! registry publishes a single `3 0 1` TLSA record at the CN carrying the
//! SHA-256 digest of the certificate. Anything else counts as revoked.
//!
//! Only usage 3 (domain-issued) records are registry records. The CN is also
//! the device's identity name, so its PKIX-CD record lives at the same name
//! and is ignored here.
//!
//! | Usage 3 records at CN               | Result       |
//! |-------------------------------------|--------------|
//! | none / lookup error                 | revoked      |
//! | more than one                       | revoked      |
//! | one, not `(3, 0, 1)`                | revoked      |
//! | one `(3, 0, 1)`, digest differs     | revoked      |
//! | one `(3, 0, 1)`, digest matches     | not revoked  |

use crate::cert::{Certificate, CertificateDigest};
use crate::discovery::{IdentityResolver, TlsaRecord};
use tracing::{debug, warn};

/// Registry membership and revocation checks for a fixed set of registry domains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryChecker {
    domains: Vec<String>,
}

impl RegistryChecker {
    pub fn new(domains: Vec<String>) -> Self {
        Self { domains }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// True if the certificate's subject CN is a strict subdomain of a registry domain
    ///
    /// A certificate without a readable CN is not registry-issued.
    pub fn is_registry_issued(&self, certificate: &Certificate) -> bool {
        match certificate.common_name() {
            Ok(cn) => self.is_registry_name(&cn),
            Err(e) => {
                debug!("No subject CN for registry match: {}", e);
                false
            }
        }
    }

    /// Reverse-label suffix match, case-insensitive
    pub fn is_registry_name(&self, name: &str) -> bool {
        self.domains
            .iter()
            .any(|domain| is_strict_subdomain(name, domain))
    }

    /// Fail-closed revocation check against the registry's TLSA record
    pub async fn is_revoked(
        &self,
        certificate: &Certificate,
        resolver: &dyn IdentityResolver,
    ) -> bool {
        let cn = match certificate.common_name() {
            Ok(cn) => cn,
            Err(e) => {
                warn!("Registry check: {}; treating as revoked", e);
                return true;
            }
        };

        let records: Vec<TlsaRecord> = match resolver.tlsa_records(&cn).await {
            Ok(records) => records
                .into_iter()
                .filter(|record| record.certificate_usage == TlsaRecord::USAGE_DOMAIN_ISSUED)
                .collect(),
            Err(e) => {
                warn!("Registry check for {}: {}; treating as revoked", cn, e);
                return true;
            }
        };

        let record = match records.as_slice() {
            [] => {
                warn!("No registry entry for {}", cn);
                return true;
            }
            [record] => record,
            _ => {
                warn!(
                    "Expected one registry entry for {}, found {}",
                    cn,
                    records.len()
                );
                return true;
            }
        };

        let expected = (
            TlsaRecord::USAGE_DOMAIN_ISSUED,
            TlsaRecord::SELECTOR_FULL_CERTIFICATE,
            TlsaRecord::MATCHING_SHA256,
        );
        if record.parameters() != expected {
            let (usage, selector, matching) = record.parameters();
            warn!(
                "Unexpected registry record format for {}: {} {} {}",
                cn, usage, selector, matching
            );
            return true;
        }

        let published = CertificateDigest::from_bytes(&record.certificate_association);
        let actual = certificate.sha256();
        if published != actual {
            warn!(
                "Registry digest mismatch for {}: published {}, presented {}",
                cn, published, actual
            );
            return true;
        }

        debug!("Registry entry for {} matches", cn);
        false
    }
}

fn is_strict_subdomain(name: &str, domain: &str) -> bool {
    let name: Vec<String> = labels(name);
    let domain: Vec<String> = labels(domain);
    if domain.is_empty() || name.len() <= domain.len() {
        return false;
    }
    name.iter().rev().zip(domain.iter().rev()).all(|(a, b)| a == b)
}

fn labels(name: &str) -> Vec<String> {
    name.trim_end_matches('.')
        .split('.')
        .filter(|label| !label.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}
