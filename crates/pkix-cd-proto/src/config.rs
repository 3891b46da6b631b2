//! Configuration types for discovery and verification
//!
//! These values are injected into [`crate::discovery::TrustDiscovery`] and
//! [`crate::verify::Verifier`] at construction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Verification policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Registry domain suffixes; a certificate whose subject CN is a strict
    /// subdomain of one of these is registry-issued
    #[serde(default = "default_registry_domains")]
    pub registry_domains: Vec<String>,

    /// How certificate digests combine with AKIs for extended trust entries
    #[serde(default)]
    pub digest_match: DigestMatch,

    /// Whether an identity missing from the access point is terminal
    #[serde(default)]
    pub unauthorized_identity: UnauthorizedIdentity,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            registry_domains: default_registry_domains(),
            digest_match: DigestMatch::default(),
            unauthorized_identity: UnauthorizedIdentity::default(),
        }
    }
}

/// Digest matching for extended trust entries
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DigestMatch {
    /// AKI match or digest match is enough
    #[default]
    Alternative,

    /// Both the AKI and the digest must match
    Required,
}

/// Handling of a claimed identity not listed under the access point
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnauthorizedIdentity {
    /// Reject immediately with `IdentityNotAuthorized`
    #[default]
    Enforce,

    /// Log, then continue into the AKI check against an empty accepted set
    Advisory,
}

/// Trust store schema written by discovery
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrustStoreSchema {
    /// `{ap: {identity: [aki, ...]}}`
    #[default]
    Simple,

    /// `{ap: {identity: {"akis": [...], "cert_hashes": [...]}}}`
    Extended,
}

/// Trust discovery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Per-identity lookup bound in seconds
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,

    /// Identities resolved concurrently
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,

    /// Output schema
    #[serde(default)]
    pub schema: TrustStoreSchema,
}

impl DiscoveryConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_secs: default_lookup_timeout(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
            schema: TrustStoreSchema::default(),
        }
    }
}

// Default value functions for serde

fn default_registry_domains() -> Vec<String> {
    vec!["iotregistry.ca".to_string()]
}

fn default_lookup_timeout() -> u64 {
    5
}

fn default_max_concurrent_lookups() -> usize {
    8
}
