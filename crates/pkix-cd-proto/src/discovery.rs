//! PKIX-CD trust discovery
//!
//! Builds the trust map and CA bundle from an access list by asking an
//! [`IdentityResolver`] for each identity's published certificates.
//!
//! # Flow
//!
//! ```text
//! AccessConfig ──► per identity (bounded concurrency, timeout)
//!                    │ resolve_certificates(identity, PKIX-CD)
//!                    │ for each certificate:
//!                    │   AKI    ──► identity accumulator
//!                    │   root   ──► CA accumulator
//!                    ▼
//!                  IdentityTrust results ──► merged by one writer
//!                                              ├─► TrustMap[ap][identity]
//!                                              └─► CaBundle
//! ```
//!
//! Resolution failures are recoverable: the identity is skipped and reported
//! in [`DiscoveryReport::failures`].

use crate::access::AccessConfig;
use crate::cert::{AuthorityKeyId, Certificate, CertificateDigest};
use crate::config::{DiscoveryConfig, TrustStoreSchema};
use crate::error::ResolutionError;
use crate::identity::DeviceIdentity;
use crate::trust_map::{CaBundle, TrustEntry, TrustMap};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Chain walk bound when a resolver does not set one
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 8;

/// A DNS TLSA record (RFC 6698)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsaRecord {
    pub certificate_usage: u8,
    pub selector: u8,
    pub matching_type: u8,
    /// Certificate association data (raw DER or digest)
    pub certificate_association: Vec<u8>,
}

impl TlsaRecord {
    /// Domain-issued certificate (DANE-EE)
    pub const USAGE_DOMAIN_ISSUED: u8 = 3;
    /// PKIX-CD: full entity certificate, issuer discovered by AKI
    pub const USAGE_PKIX_CD: u8 = 4;
    pub const SELECTOR_FULL_CERTIFICATE: u8 = 0;
    pub const MATCHING_EXACT: u8 = 0;
    pub const MATCHING_SHA256: u8 = 1;

    pub fn new(
        certificate_usage: u8,
        selector: u8,
        matching_type: u8,
        certificate_association: Vec<u8>,
    ) -> Self {
        Self {
            certificate_usage,
            selector,
            matching_type,
            certificate_association,
        }
    }

    /// PKIX-CD record carrying a full certificate
    pub fn pkix_cd(certificate: &Certificate) -> Self {
        Self::new(
            Self::USAGE_PKIX_CD,
            Self::SELECTOR_FULL_CERTIFICATE,
            Self::MATCHING_EXACT,
            certificate.der().to_vec(),
        )
    }

    /// `3 0 1` record: SHA-256 of a domain-issued certificate
    pub fn domain_issued_sha256(certificate: &Certificate) -> Self {
        Self::new(
            Self::USAGE_DOMAIN_ISSUED,
            Self::SELECTOR_FULL_CERTIFICATE,
            Self::MATCHING_SHA256,
            certificate.sha256_bytes(),
        )
    }

    /// `(usage, selector, matching type)`
    pub fn parameters(&self) -> (u8, u8, u8) {
        (self.certificate_usage, self.selector, self.matching_type)
    }
}

/// Which published certificates an identity lookup returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageFilter {
    /// Usage 4, full certificate, exact match
    PkixCd,
    /// Usage 3, full certificate, exact match
    DaneEe,
    /// Either of the above
    Any,
}

impl UsageFilter {
    pub fn matches(&self, record: &TlsaRecord) -> bool {
        let full_cert = record.selector == TlsaRecord::SELECTOR_FULL_CERTIFICATE
            && record.matching_type == TlsaRecord::MATCHING_EXACT;
        let usage = record.certificate_usage;
        full_cert
            && match self {
                UsageFilter::PkixCd => usage == TlsaRecord::USAGE_PKIX_CD,
                UsageFilter::DaneEe => usage == TlsaRecord::USAGE_DOMAIN_ISSUED,
                UsageFilter::Any => {
                    usage == TlsaRecord::USAGE_PKIX_CD || usage == TlsaRecord::USAGE_DOMAIN_ISSUED
                }
            }
    }
}

/// Result of validating a certificate live against DNS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveValidation {
    pub valid: bool,
    pub reason: String,
}

impl LiveValidation {
    pub fn passed(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// Identity resolution capability
///
/// Implementors supply two primitives: TLSA lookup and CA certificate
/// retrieval by authority key identifier. Certificate discovery, chain
/// walking and live validation are built on them.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// TLSA records published at `dns_name`
    async fn tlsa_records(&self, dns_name: &str) -> Result<Vec<TlsaRecord>, ResolutionError>;

    /// CA certificate whose subject key identifier is `authority_key_id`
    async fn ca_certificate(
        &self,
        identity: &DeviceIdentity,
        authority_key_id: &AuthorityKeyId,
    ) -> Result<Certificate, ResolutionError>;

    fn max_chain_depth(&self) -> usize {
        DEFAULT_MAX_CHAIN_DEPTH
    }

    /// Certificates currently published for an identity, keyed by SHA-256
    async fn resolve_certificates(
        &self,
        identity: &DeviceIdentity,
        usage: UsageFilter,
    ) -> Result<BTreeMap<String, Certificate>, ResolutionError> {
        let records = self.tlsa_records(identity.as_str()).await?;
        let mut certificates = BTreeMap::new();
        for record in records.iter().filter(|r| usage.matches(r)) {
            let certificate = Certificate::from_der(record.certificate_association.clone())
                .map_err(|e| ResolutionError::MalformedRecords {
                    name: identity.to_string(),
                    reason: e.to_string(),
                })?;
            certificates.insert(certificate.sha256().to_string(), certificate);
        }
        if certificates.is_empty() {
            return Err(ResolutionError::NoRecords(identity.to_string()));
        }
        Ok(certificates)
    }

    /// Follow AKIs upward until a self-issued certificate
    async fn trust_chain_root(
        &self,
        identity: &DeviceIdentity,
        certificate: &Certificate,
    ) -> Result<Certificate, ResolutionError> {
        let mut current = certificate.clone();
        for _ in 0..self.max_chain_depth() {
            if current.is_self_issued()? {
                return Ok(current);
            }
            let aki = current.authority_key_id()?;
            current = self.ca_certificate(identity, &aki).await?;
        }
        Err(ResolutionError::ChainTooDeep {
            name: identity.to_string(),
            max_depth: self.max_chain_depth(),
        })
    }

    /// Validate a presented certificate directly against published DNS data
    ///
    /// The certificate must be one of the identity's PKIX-CD certificates,
    /// be within its validity period, and be signed by the CA its AKI names.
    async fn validate_certificate_live(
        &self,
        identity: &str,
        certificate: &Certificate,
    ) -> LiveValidation {
        let identity = match DeviceIdentity::parse(identity) {
            Ok(identity) => identity,
            Err(e) => return LiveValidation::failed(e.to_string()),
        };
        let published = match self.resolve_certificates(&identity, UsageFilter::PkixCd).await {
            Ok(published) => published,
            Err(e) => return LiveValidation::failed(e.to_string()),
        };
        if !published.values().any(|c| c == certificate) {
            return LiveValidation::failed(format!(
                "Presented certificate is not published for {}",
                identity
            ));
        }
        match certificate.is_time_valid() {
            Ok(true) => {}
            Ok(false) => return LiveValidation::failed("Certificate is outside its validity period"),
            Err(e) => return LiveValidation::failed(e.to_string()),
        }
        let aki = match certificate.authority_key_id() {
            Ok(aki) => aki,
            Err(e) => return LiveValidation::failed(e.to_string()),
        };
        let issuer = match self.ca_certificate(&identity, &aki).await {
            Ok(issuer) => issuer,
            Err(e) => return LiveValidation::failed(e.to_string()),
        };
        if let Err(e) = certificate.verify_issued_by(&issuer) {
            return LiveValidation::failed(e.to_string());
        }
        LiveValidation::passed(format!(
            "Certificate matches PKIX-CD record for {} and is signed by {}",
            identity, aki
        ))
    }
}

/// In-memory resolver
///
/// Serves TLSA records and CA certificates from maps. Used for tests and for
/// offline runs against a fixed set of published data.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    records: BTreeMap<String, Vec<TlsaRecord>>,
    ca_certificates: BTreeMap<AuthorityKeyId, Certificate>,
    failures: BTreeMap<String, ResolutionError>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a PKIX-CD record for `name`
    pub fn with_identity_certificate(self, name: &str, certificate: &Certificate) -> Self {
        self.with_tlsa_record(name, TlsaRecord::pkix_cd(certificate))
    }

    pub fn with_tlsa_record(mut self, name: &str, record: TlsaRecord) -> Self {
        self.records
            .entry(name.to_string())
            .or_default()
            .push(record);
        self
    }

    /// Publish a CA certificate under its subject key identifier
    ///
    /// Certificates without an SKI cannot be found and are ignored.
    pub fn with_ca_certificate(mut self, certificate: &Certificate) -> Self {
        if let Ok(Some(ski)) = certificate.subject_key_id() {
            self.ca_certificates.insert(ski, certificate.clone());
        }
        self
    }

    /// Make every lookup of `name` fail
    pub fn with_failure(mut self, name: &str, error: ResolutionError) -> Self {
        self.failures.insert(name.to_string(), error);
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn tlsa_records(&self, dns_name: &str) -> Result<Vec<TlsaRecord>, ResolutionError> {
        if let Some(error) = self.failures.get(dns_name) {
            return Err(error.clone());
        }
        Ok(self.records.get(dns_name).cloned().unwrap_or_default())
    }

    async fn ca_certificate(
        &self,
        _identity: &DeviceIdentity,
        authority_key_id: &AuthorityKeyId,
    ) -> Result<Certificate, ResolutionError> {
        self.ca_certificates
            .get(authority_key_id)
            .cloned()
            .ok_or_else(|| ResolutionError::NoCaCertificate(authority_key_id.to_string()))
    }
}

/// Trust discovered for one identity
#[derive(Debug, Clone, Default)]
pub struct IdentityTrust {
    pub akis: Vec<AuthorityKeyId>,
    pub digests: Vec<CertificateDigest>,
    pub roots: CaBundle,
}

impl IdentityTrust {
    fn entry(&self, schema: TrustStoreSchema) -> TrustEntry {
        match schema {
            TrustStoreSchema::Simple => TrustEntry::simple(self.akis.iter().cloned()),
            TrustStoreSchema::Extended => {
                TrustEntry::extended(self.akis.iter().cloned(), self.digests.iter().cloned())
            }
        }
    }
}

/// Output of one discovery run
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub trust_map: TrustMap,
    pub ca_bundle: CaBundle,
    /// Identities skipped this run
    pub failures: Vec<(DeviceIdentity, ResolutionError)>,
}

impl DiscoveryReport {
    /// Copy prior entries forward for identities that failed this run
    ///
    /// Only pairs still present in `access` are carried. Returns the number of
    /// entries copied.
    pub fn carry_forward(&mut self, prior: &TrustMap, access: &AccessConfig) -> usize {
        let mut carried = 0;
        for (identity, _) in &self.failures {
            for access_point in access.access_points(identity) {
                if let Some(entry) = prior.get(access_point, identity.as_str()) {
                    self.trust_map
                        .insert(access_point.clone(), identity.as_str(), entry.clone());
                    carried += 1;
                }
            }
        }
        if carried > 0 {
            info!("Kept {} stale trust map entries for unresolved identities", carried);
        }
        carried
    }
}

/// Trust discovery engine
#[derive(Clone)]
pub struct TrustDiscovery {
    resolver: Arc<dyn IdentityResolver>,
    config: DiscoveryConfig,
}

impl TrustDiscovery {
    pub fn new(resolver: Arc<dyn IdentityResolver>, config: DiscoveryConfig) -> Self {
        Self { resolver, config }
    }

    /// Discover AKIs, digests and roots for one identity, within the lookup bound
    pub async fn discover_identity(
        &self,
        identity: &DeviceIdentity,
    ) -> Result<IdentityTrust, ResolutionError> {
        let timeout = self.config.lookup_timeout();
        match tokio::time::timeout(timeout, resolve_identity(self.resolver.as_ref(), identity)).await
        {
            Ok(result) => result,
            Err(_) => Err(ResolutionError::Timeout {
                name: identity.to_string(),
                secs: self.config.lookup_timeout_secs,
            }),
        }
    }

    /// Build a fresh trust map and CA bundle for every identity in `access`
    pub async fn discover(&self, access: &AccessConfig) -> DiscoveryReport {
        let limit = Arc::new(Semaphore::new(self.config.max_concurrent_lookups.max(1)));
        let mut tasks = JoinSet::new();

        for identity in access.identities() {
            let engine = self.clone();
            let identity = identity.clone();
            let limit = Arc::clone(&limit);
            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await;
                let result = engine.discover_identity(&identity).await;
                (identity, result)
            });
        }

        // Collect, then merge in identity order
        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((identity, result)) => {
                    results.insert(identity, result);
                }
                Err(e) => error!("Discovery task failed: {}", e),
            }
        }

        let mut report = DiscoveryReport::default();
        for (identity, result) in results {
            match result {
                Ok(trust) => {
                    let entry = trust.entry(self.config.schema);
                    for access_point in access.access_points(&identity) {
                        report
                            .trust_map
                            .insert(access_point.clone(), identity.as_str(), entry.clone());
                    }
                    report.ca_bundle.extend(trust.roots);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", identity, e);
                    report.failures.push((identity, e));
                }
            }
        }

        info!(
            "Discovery complete: {} identities, {} failed, {} CA certificate(s)",
            access.len(),
            report.failures.len(),
            report.ca_bundle.len()
        );
        report
    }
}

async fn resolve_identity(
    resolver: &dyn IdentityResolver,
    identity: &DeviceIdentity,
) -> Result<IdentityTrust, ResolutionError> {
    let certificates = resolver
        .resolve_certificates(identity, UsageFilter::PkixCd)
        .await?;

    let mut trust = IdentityTrust::default();
    for certificate in certificates.values() {
        trust.akis.push(certificate.authority_key_id()?);
        trust.digests.push(certificate.sha256());
        trust
            .roots
            .insert(resolver.trust_chain_root(identity, certificate).await?);
    }
    debug!("{}: {} certificate(s), AKIs {:?}", identity, certificates.len(), trust.akis);
    Ok(trust)
}
