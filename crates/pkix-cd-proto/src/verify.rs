//! Supplicant verification decision procedure
//!
//! Decides whether a device presenting a certificate may join an access point.
//! Checks run in order and the first failure is terminal:
//!
//! 1. trust map readable                      → [`Outcome::TrustMapMissing`]
//! 2. certificate file readable               → [`Outcome::CertificateFileMissing`]
//! 3. access point listed in the trust map    → [`Outcome::UnknownAccessPoint`]
//! 4. identity listed under the access point  → [`Outcome::IdentityNotAuthorized`]
//! 5. certificate AKI (or digest) accepted    → [`Outcome::AuthorityKeyMismatch`]
//! 6. live DNS validation, when requested     → [`Outcome::LiveVerificationFailed`]
//! 7. registry issuance and revocation        → [`Outcome::RegistryCheckFailed`]
//!
//! Step 5 is the cross-domain impersonation defense: a certificate from an
//! authority not bound to the claimed identity at this access point is refused
//! no matter what name it carries.
//!
//! Verification never mutates state. Without live or registry checks it is a
//! pure function of the trust map, certificate, identity and access point.

use crate::cert::Certificate;
use crate::config::{UnauthorizedIdentity, VerifyPolicy};
use crate::discovery::{IdentityResolver, LiveValidation};
use crate::error::CertificateError;
use crate::identity::strip_root;
use crate::registry::RegistryChecker;
use crate::trust_map::{TrustEntry, TrustMap};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Separator between the realm prefix and the access point in a Called-Station-Id
pub const CALLED_STATION_SEPARATOR: char = ':';

/// Default bound on live and registry lookups
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Terminal verification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    TrustMapMissing,
    CertificateFileMissing,
    UnknownAccessPoint,
    IdentityNotAuthorized,
    AuthorityKeyMismatch,
    LiveVerificationFailed,
    RegistryCheckFailed,
}

impl Outcome {
    /// Process exit code for the verify tool
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Accepted => 0,
            Outcome::TrustMapMissing => 1,
            Outcome::CertificateFileMissing => 2,
            Outcome::UnknownAccessPoint => 3,
            Outcome::AuthorityKeyMismatch => 4,
            Outcome::LiveVerificationFailed => 5,
            Outcome::RegistryCheckFailed => 6,
            Outcome::IdentityNotAuthorized => 7,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::TrustMapMissing => "trust_map_missing",
            Outcome::CertificateFileMissing => "certificate_file_missing",
            Outcome::UnknownAccessPoint => "unknown_access_point",
            Outcome::IdentityNotAuthorized => "identity_not_authorized",
            Outcome::AuthorityKeyMismatch => "authority_key_mismatch",
            Outcome::LiveVerificationFailed => "live_verification_failed",
            Outcome::RegistryCheckFailed => "registry_check_failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outcome plus a one-line reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub outcome: Outcome,
    pub reason: String,
}

impl Decision {
    pub fn new(outcome: Outcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: reason.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.outcome, self.reason)
    }
}

/// Extract the access point from `<prefix>:<ssid>`
///
/// Everything after the first separator is the access point, so
/// `NAS:lobby:5g` yields `lobby:5g`. Returns `None` without a separator.
pub fn normalize_access_point(called_station: &str) -> Option<&str> {
    called_station
        .split_once(CALLED_STATION_SEPARATOR)
        .map(|(_, access_point)| access_point)
}

/// Inputs for one verification
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    /// Called-Station-Id, `<prefix>:<access point>`
    pub called_station: String,
    /// Calling-Station-Id, the claimed device identity
    pub identity: String,
    pub certificate_path: PathBuf,
    pub trust_map_path: PathBuf,
}

/// Optional network-backed checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Validate the certificate against current DNS data
    pub live_verify: bool,
    /// Only accept registry-issued certificates
    pub require_registry: bool,
}

/// Verification decision procedure
pub struct Verifier {
    resolver: Option<Arc<dyn IdentityResolver>>,
    registry: RegistryChecker,
    policy: VerifyPolicy,
    lookup_timeout: Duration,
}

impl Verifier {
    /// Offline verifier; live and registry checks fail closed until a resolver is set
    pub fn new(policy: VerifyPolicy) -> Self {
        Self {
            resolver: None,
            registry: RegistryChecker::new(policy.registry_domains.clone()),
            policy,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &VerifyPolicy {
        &self.policy
    }

    /// Run the full procedure against files on disk
    pub async fn verify(&self, request: &VerifyRequest, options: VerifyOptions) -> Decision {
        let trust_map = match TrustMap::load(&request.trust_map_path) {
            Ok(map) => map,
            Err(e) => return self.reject(Outcome::TrustMapMissing, e.to_string()),
        };

        // Only I/O errors mean a missing file; undecodable contents fall through
        let certificate = match std::fs::read(&request.certificate_path) {
            Ok(data) => Certificate::from_pem_or_der(&data),
            Err(e) => {
                return self.reject(
                    Outcome::CertificateFileMissing,
                    format!("{}: {}", request.certificate_path.display(), e),
                )
            }
        };

        self.decide_certificate(
            &trust_map,
            &request.called_station,
            &request.identity,
            certificate,
            options,
        )
        .await
    }

    /// Steps 3 onward, over an already loaded trust map and certificate
    pub async fn decide(
        &self,
        trust_map: &TrustMap,
        called_station: &str,
        identity: &str,
        certificate_pem: &str,
        options: VerifyOptions,
    ) -> Decision {
        self.decide_certificate(
            trust_map,
            called_station,
            identity,
            Certificate::from_pem(certificate_pem),
            options,
        )
        .await
    }

    async fn decide_certificate(
        &self,
        trust_map: &TrustMap,
        called_station: &str,
        identity: &str,
        certificate: Result<Certificate, CertificateError>,
        options: VerifyOptions,
    ) -> Decision {
        // Access lists store identities without the root dot
        let identity = strip_root(identity);
        let access_point = match normalize_access_point(called_station) {
            Some(access_point) => access_point,
            None => {
                return self.reject(
                    Outcome::UnknownAccessPoint,
                    format!("Malformed Called-Station-Id '{}'", called_station),
                )
            }
        };
        let identities = match trust_map.identities(access_point) {
            Some(identities) => identities,
            None => {
                return self.reject(
                    Outcome::UnknownAccessPoint,
                    format!("Unknown access point '{}'", access_point),
                )
            }
        };

        let entry: Option<&TrustEntry> = identities.get(identity);
        if entry.is_none() {
            let reason = format!("{} is not authorized for {}", identity, access_point);
            match self.policy.unauthorized_identity {
                UnauthorizedIdentity::Enforce => {
                    return self.reject(Outcome::IdentityNotAuthorized, reason)
                }
                UnauthorizedIdentity::Advisory => warn!("{}", reason),
            }
        }

        let certificate = match certificate {
            Ok(certificate) => certificate,
            Err(e) => return self.reject(Outcome::AuthorityKeyMismatch, e.to_string()),
        };
        let aki = certificate.authority_key_id().ok();
        let digest = certificate.sha256();
        let accepted = entry.map_or(false, |entry| {
            entry.accepts(aki.as_ref(), &digest, self.policy.digest_match)
        });
        if !accepted {
            let presented = aki.map_or_else(|| "none".to_string(), |aki| aki.to_string());
            return self.reject(
                Outcome::AuthorityKeyMismatch,
                format!(
                    "Authority key {} is not trusted for {} at {}",
                    presented, identity, access_point
                ),
            );
        }

        if options.live_verify {
            let validation = self.validate_live(identity, &certificate).await;
            if !validation.valid {
                return self.reject(Outcome::LiveVerificationFailed, validation.reason);
            }
        }

        let registry_issued = self.registry.is_registry_issued(&certificate);
        if options.require_registry && !registry_issued {
            return self.reject(
                Outcome::RegistryCheckFailed,
                "Certificate is not issued under a registry domain",
            );
        }
        if registry_issued && self.is_revoked(&certificate).await {
            return self.reject(
                Outcome::RegistryCheckFailed,
                "Registry does not vouch for this certificate",
            );
        }

        info!("Accepted {} at {}", identity, access_point);
        Decision::new(
            Outcome::Accepted,
            format!("{} accepted at {}", identity, access_point),
        )
    }

    async fn validate_live(&self, identity: &str, certificate: &Certificate) -> LiveValidation {
        let Some(resolver) = &self.resolver else {
            return LiveValidation::failed("No identity resolver configured");
        };
        match tokio::time::timeout(
            self.lookup_timeout,
            resolver.validate_certificate_live(identity, certificate),
        )
        .await
        {
            Ok(validation) => validation,
            Err(_) => LiveValidation::failed(format!(
                "Live validation timed out after {}s",
                self.lookup_timeout.as_secs()
            )),
        }
    }

    async fn is_revoked(&self, certificate: &Certificate) -> bool {
        let Some(resolver) = &self.resolver else {
            warn!("No identity resolver for registry check; treating as revoked");
            return true;
        };
        match tokio::time::timeout(
            self.lookup_timeout,
            self.registry.is_revoked(certificate, resolver.as_ref()),
        )
        .await
        {
            Ok(revoked) => revoked,
            Err(_) => {
                warn!("Registry lookup timed out; treating as revoked");
                true
            }
        }
    }

    fn reject(&self, outcome: Outcome, reason: impl Into<String>) -> Decision {
        let decision = Decision::new(outcome, reason);
        warn!("{}", decision);
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::AuthorityKeyId;
    use crate::config::DigestMatch;
    use crate::discovery::{StaticResolver, TlsaRecord};
    use crate::error::ResolutionError;
    use crate::identity::DeviceIdentity;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const DEVICE: &str = include_str!("../tests/fixtures/device.cert.pem");
    const IMPOSTOR: &str = include_str!("../tests/fixtures/impostor.cert.pem");
    const CA: &str = include_str!("../tests/fixtures/ca.cert.pem");
    const REGISTRY_DEVICE: &str = include_str!("../tests/fixtures/registry-device.cert.pem");

    const MY_DEVICE: &str = "my._device.example.com";
    const REGISTRY_CN: &str = "air-sensor.iotregistry.ca";

    fn trust_map() -> TrustMap {
        serde_json::from_str(
            r#"{"SSID1": {"my._device.example.com": ["aa-bb-cc"],
                          "air-sensor.iotregistry.ca": ["01-02-03-04"]}}"#,
        )
        .unwrap()
    }

    fn offline() -> Verifier {
        Verifier::new(VerifyPolicy::default())
    }

    fn cert(pem: &str) -> Certificate {
        Certificate::from_pem(pem).unwrap()
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let outcomes = [
            Outcome::Accepted,
            Outcome::TrustMapMissing,
            Outcome::CertificateFileMissing,
            Outcome::UnknownAccessPoint,
            Outcome::IdentityNotAuthorized,
            Outcome::AuthorityKeyMismatch,
            Outcome::LiveVerificationFailed,
            Outcome::RegistryCheckFailed,
        ];
        let mut codes: Vec<i32> = outcomes.iter().map(Outcome::exit_code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes, (0..=7).collect::<Vec<_>>());
        assert_eq!(Outcome::AuthorityKeyMismatch.exit_code(), 4);
    }

    #[test]
    fn test_normalize_access_point() {
        assert_eq!(normalize_access_point("NAS:SSID1"), Some("SSID1"));
        assert_eq!(normalize_access_point("NAS:lobby:5g"), Some("lobby:5g"));
        assert_eq!(normalize_access_point(":SSID1"), Some("SSID1"));
        assert_eq!(normalize_access_point("SSID1"), None);
    }

    #[tokio::test]
    async fn test_accepts_trusted_authority() {
        let decision = offline()
            .decide(&trust_map(), "NAS:SSID1", MY_DEVICE, DEVICE, VerifyOptions::default())
            .await;
        assert_eq!(decision.outcome, Outcome::Accepted, "{}", decision.reason);
    }

    #[tokio::test]
    async fn test_rejects_foreign_authority() {
        // Right name, wrong issuer
        let decision = offline()
            .decide(&trust_map(), "NAS:SSID1", MY_DEVICE, IMPOSTOR, VerifyOptions::default())
            .await;
        assert_eq!(decision.outcome, Outcome::AuthorityKeyMismatch);
        assert!(decision.reason.contains("dd-ee-ff"));
    }

    #[tokio::test]
    async fn test_unknown_access_point() {
        let verifier = offline();
        let options = VerifyOptions::default();
        let unknown = verifier
            .decide(&trust_map(), "NAS:UNKNOWNSSID", MY_DEVICE, DEVICE, options)
            .await;
        assert_eq!(unknown.outcome, Outcome::UnknownAccessPoint);

        let malformed = verifier
            .decide(&trust_map(), "SSID1", MY_DEVICE, DEVICE, options)
            .await;
        assert_eq!(malformed.outcome, Outcome::UnknownAccessPoint);
    }

    #[tokio::test]
    async fn test_unauthorized_identity_enforced() {
        let decision = offline()
            .decide(
                &trust_map(),
                "NAS:SSID1",
                "stranger._device.example.com",
                DEVICE,
                VerifyOptions::default(),
            )
            .await;
        assert_eq!(decision.outcome, Outcome::IdentityNotAuthorized);
        assert_eq!(decision.exit_code(), 7);
    }

    #[tokio::test]
    async fn test_unauthorized_identity_advisory_falls_through() {
        let policy = VerifyPolicy {
            unauthorized_identity: UnauthorizedIdentity::Advisory,
            ..VerifyPolicy::default()
        };
        let decision = Verifier::new(policy)
            .decide(
                &trust_map(),
                "NAS:SSID1",
                "stranger._device.example.com",
                DEVICE,
                VerifyOptions::default(),
            )
            .await;
        assert_eq!(decision.outcome, Outcome::AuthorityKeyMismatch);
    }

    #[tokio::test]
    async fn test_unparseable_certificate_is_mismatch() {
        let decision = offline()
            .decide(&trust_map(), "NAS:SSID1", MY_DEVICE, "garbage", VerifyOptions::default())
            .await;
        assert_eq!(decision.outcome, Outcome::AuthorityKeyMismatch);
    }

    #[tokio::test]
    async fn test_extended_entry_digest_policy() {
        let mut map = TrustMap::new();
        map.insert(
            "SSID1",
            MY_DEVICE,
            TrustEntry::extended([AuthorityKeyId::normalize("99-99")], [cert(DEVICE).sha256()]),
        );
        let options = VerifyOptions::default();

        let alternative = offline()
            .decide(&map, "NAS:SSID1", MY_DEVICE, DEVICE, options)
            .await;
        assert_eq!(alternative.outcome, Outcome::Accepted);

        let required = Verifier::new(VerifyPolicy {
            digest_match: DigestMatch::Required,
            ..VerifyPolicy::default()
        })
        .decide(&map, "NAS:SSID1", MY_DEVICE, DEVICE, options)
        .await;
        assert_eq!(required.outcome, Outcome::AuthorityKeyMismatch);
    }

    #[tokio::test]
    async fn test_require_registry_rejects_non_registry_certificate() {
        let options = VerifyOptions {
            require_registry: true,
            ..VerifyOptions::default()
        };
        let decision = offline()
            .decide(&trust_map(), "NAS:SSID1", MY_DEVICE, DEVICE, options)
            .await;
        assert_eq!(decision.outcome, Outcome::RegistryCheckFailed);
    }

    #[tokio::test]
    async fn test_registry_certificate_revocation() {
        let device = cert(REGISTRY_DEVICE);
        let options = VerifyOptions {
            require_registry: true,
            ..VerifyOptions::default()
        };

        let listed = StaticResolver::new()
            .with_tlsa_record(REGISTRY_CN, TlsaRecord::domain_issued_sha256(&device));
        let decision = offline()
            .with_resolver(Arc::new(listed))
            .decide(&trust_map(), "NAS:SSID1", REGISTRY_CN, REGISTRY_DEVICE, options)
            .await;
        assert_eq!(decision.outcome, Outcome::Accepted, "{}", decision.reason);

        // Registry certificates are always checked, even when not required
        let unlisted = offline()
            .with_resolver(Arc::new(StaticResolver::new()))
            .decide(
                &trust_map(),
                "NAS:SSID1",
                REGISTRY_CN,
                REGISTRY_DEVICE,
                VerifyOptions::default(),
            )
            .await;
        assert_eq!(unlisted.outcome, Outcome::RegistryCheckFailed);

        // No resolver at all fails closed
        let offline_decision = offline()
            .decide(&trust_map(), "NAS:SSID1", REGISTRY_CN, REGISTRY_DEVICE, options)
            .await;
        assert_eq!(offline_decision.outcome, Outcome::RegistryCheckFailed);
    }

    #[tokio::test]
    async fn test_live_verification() {
        let options = VerifyOptions {
            live_verify: true,
            ..VerifyOptions::default()
        };
        let published = StaticResolver::new()
            .with_identity_certificate(MY_DEVICE, &cert(DEVICE))
            .with_ca_certificate(&cert(CA));
        let decision = offline()
            .with_resolver(Arc::new(published))
            .decide(&trust_map(), "NAS:SSID1", MY_DEVICE, DEVICE, options)
            .await;
        assert_eq!(decision.outcome, Outcome::Accepted, "{}", decision.reason);

        let withdrawn = offline()
            .with_resolver(Arc::new(StaticResolver::new()))
            .decide(&trust_map(), "NAS:SSID1", MY_DEVICE, DEVICE, options)
            .await;
        assert_eq!(withdrawn.outcome, Outcome::LiveVerificationFailed);
        assert!(withdrawn.reason.contains("No TLSA records"));

        let no_resolver = offline()
            .decide(&trust_map(), "NAS:SSID1", MY_DEVICE, DEVICE, options)
            .await;
        assert_eq!(no_resolver.outcome, Outcome::LiveVerificationFailed);
    }

    #[tokio::test]
    async fn test_identity_root_dot_ignored() {
        let decision = offline()
            .decide(
                &trust_map(),
                "NAS:SSID1",
                "my._device.example.com.",
                DEVICE,
                VerifyOptions::default(),
            )
            .await;
        assert_eq!(decision.outcome, Outcome::Accepted, "{}", decision.reason);
    }

    fn request(dir: &TempDir, certificate: &[u8]) -> VerifyRequest {
        let trust_map_path = dir.path().join("trustmap.json");
        std::fs::write(&trust_map_path, serde_json::to_string(&trust_map()).unwrap()).unwrap();
        let certificate_path = dir.path().join("device.crt");
        std::fs::write(&certificate_path, certificate).unwrap();
        VerifyRequest {
            called_station: "NAS:SSID1".to_string(),
            identity: MY_DEVICE.to_string(),
            certificate_path,
            trust_map_path,
        }
    }

    #[tokio::test]
    async fn test_certificate_file_formats() {
        let dir = TempDir::new().unwrap();
        let options = VerifyOptions::default();

        let der = offline().verify(&request(&dir, cert(DEVICE).der()), options).await;
        assert_eq!(der.outcome, Outcome::Accepted, "{}", der.reason);

        let pem = offline().verify(&request(&dir, DEVICE.as_bytes()), options).await;
        assert_eq!(pem.outcome, Outcome::Accepted, "{}", pem.reason);

        // Present but undecodable
        let binary = offline().verify(&request(&dir, &[0xff, 0xfe, 0x00, 0x80]), options).await;
        assert_eq!(binary.outcome, Outcome::AuthorityKeyMismatch);

        let mut missing = request(&dir, DEVICE.as_bytes());
        missing.certificate_path = dir.path().join("absent.crt");
        let missing = offline().verify(&missing, options).await;
        assert_eq!(missing.outcome, Outcome::CertificateFileMissing);
    }

    struct SlowResolver;

    #[async_trait]
    impl IdentityResolver for SlowResolver {
        async fn tlsa_records(&self, _dns_name: &str) -> Result<Vec<TlsaRecord>, ResolutionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![])
        }

        async fn ca_certificate(
            &self,
            _identity: &DeviceIdentity,
            aki: &AuthorityKeyId,
        ) -> Result<Certificate, ResolutionError> {
            Err(ResolutionError::NoCaCertificate(aki.to_string()))
        }
    }

    fn slow() -> Verifier {
        offline()
            .with_resolver(Arc::new(SlowResolver))
            .with_lookup_timeout(Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_verification_timeout_fails() {
        let options = VerifyOptions {
            live_verify: true,
            ..VerifyOptions::default()
        };
        let decision = slow()
            .decide(&trust_map(), "NAS:SSID1", MY_DEVICE, DEVICE, options)
            .await;
        assert_eq!(decision.outcome, Outcome::LiveVerificationFailed);
        assert!(decision.reason.contains("timed out"), "{}", decision.reason);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_lookup_timeout_is_revoked() {
        for require_registry in [false, true] {
            let options = VerifyOptions {
                require_registry,
                ..VerifyOptions::default()
            };
            let decision = slow()
                .decide(&trust_map(), "NAS:SSID1", REGISTRY_CN, REGISTRY_DEVICE, options)
                .await;
            assert_eq!(decision.outcome, Outcome::RegistryCheckFailed);
        }
    }
}
