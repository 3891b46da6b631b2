//! PKIX-CD trust for RADIUS supplicant authorization
//!
//! This crate builds and consults a trust map binding access points (SSIDs)
//! to device identities and, per identity, to the certificate authorities
//! allowed to vouch for it. Authority discovery uses PKIX-CD: each device
//! publishes its certificate in DNS, and the issuer is found by the
//! certificate's Authority Key Identifier.
//!
//! # Features
//!
//! - Pipe-delimited access list loading with per-line diagnostics
//! - Trust discovery with bounded concurrency and per-identity timeouts
//! - Simple and extended (`cert_hashes`) trust store schemas
//! - Atomic, change-detecting trust store persistence
//! - Ordered verification with a distinct outcome per failure class
//! - Fail-closed revocation registry check
//! - `dns` feature: live DNS (TLSA) and HTTPS (CA certificate) resolver
//!
//! # Example
//!
//! ```rust,no_run
//! use pkix_cd_proto::{
//!     AccessConfig, DiscoveryConfig, StaticResolver, TrustDiscovery, Verifier, VerifyOptions,
//!     VerifyPolicy,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let access = AccessConfig::load("/etc/radius/access.txt")?;
//! let engine = TrustDiscovery::new(Arc::new(StaticResolver::new()), DiscoveryConfig::default());
//! let report = engine.discover(&access.config).await;
//! report.trust_map.save_if_changed("/etc/radius/trustmap.json")?;
//!
//! let decision = Verifier::new(VerifyPolicy::default())
//!     .decide(
//!         &report.trust_map,
//!         "NAS:SSID1",
//!         "my._device.example.com",
//!         &std::fs::read_to_string("device.pem")?,
//!         VerifyOptions::default(),
//!     )
//!     .await;
//! println!("{}", decision);
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod cert;
pub mod config;
pub mod discovery;
#[cfg(feature = "dns")]
pub mod dns;
pub mod error;
pub mod identity;
pub mod registry;
pub mod trust_map;
pub mod verify;

pub use access::{AccessConfig, AccessConfigLoad};
pub use cert::{AuthorityKeyId, Certificate, CertificateDigest};
pub use config::{DigestMatch, DiscoveryConfig, TrustStoreSchema, UnauthorizedIdentity, VerifyPolicy};
pub use discovery::{
    DiscoveryReport, IdentityResolver, LiveValidation, StaticResolver, TlsaRecord, TrustDiscovery,
    UsageFilter,
};
#[cfg(feature = "dns")]
pub use dns::{DnsIdentityResolver, DnsResolverConfig};
pub use error::{
    AccessListError, CertificateError, IdentityError, PersistenceError, ResolutionError,
};
pub use identity::{AccessPointId, DeviceIdentity};
pub use registry::RegistryChecker;
pub use trust_map::{write_ca_bundle, CaBundle, TrustEntry, TrustMap};
pub use verify::{Decision, Outcome, Verifier, VerifyOptions, VerifyRequest};
