use pkix_cd_proto::{DiscoveryConfig, DnsResolverConfig, TrustStoreSchema, VerifyPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Tool configuration shared by `pkix_cd_manage_trust` and `pkix_cd_verify`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Audit log file path (JSON lines, optional)
    #[serde(default)]
    pub audit_log_path: Option<String>,

    /// Name server, `IP` or `IP:port`; `--ns_override` takes precedence
    #[serde(default)]
    pub nameserver: Option<String>,

    /// DNS lookup bound per identity, in seconds (default: 5)
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,

    /// CA certificate fetch bound, in seconds (default: 5)
    #[serde(default = "default_https_timeout_secs")]
    pub https_timeout_secs: u64,

    /// Identities resolved in parallel during discovery (default: 8)
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,

    /// Longest CA chain followed to a root (default: 8)
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Reject DNS answers that are not DNSSEC-validated (default: false)
    #[serde(default)]
    pub require_dnssec: bool,

    /// Trust store schema written by discovery (default: "simple")
    #[serde(default)]
    pub trust_store_schema: TrustStoreSchema,

    /// Verification policy
    #[serde(default)]
    pub policy: VerifyPolicy,
}

fn default_lookup_timeout_secs() -> u64 {
    5
}

fn default_https_timeout_secs() -> u64 {
    5
}

fn default_max_concurrent_lookups() -> usize {
    8
}

fn default_max_chain_depth() -> usize {
    8
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: None,
            audit_log_path: None,
            nameserver: None,
            lookup_timeout_secs: default_lookup_timeout_secs(),
            https_timeout_secs: default_https_timeout_secs(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
            max_chain_depth: default_max_chain_depth(),
            require_dnssec: false,
            trust_store_schema: TrustStoreSchema::default(),
            policy: VerifyPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise defaults
    pub fn load_optional<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            lookup_timeout_secs: self.lookup_timeout_secs,
            max_concurrent_lookups: self.max_concurrent_lookups,
            schema: self.trust_store_schema,
        }
    }

    /// Resolver settings; `ns_override` replaces the configured name server
    pub fn resolver_config(&self, ns_override: Option<&str>) -> DnsResolverConfig {
        DnsResolverConfig {
            nameserver: ns_override
                .map(str::to_string)
                .or_else(|| self.nameserver.clone()),
            dns_timeout: Duration::from_secs(self.lookup_timeout_secs),
            https_timeout: Duration::from_secs(self.https_timeout_secs),
            max_chain_depth: self.max_chain_depth,
            require_dnssec: self.require_dnssec,
        }
    }

    /// Bound on a whole live or registry check: DNS plus CA fetches
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs + self.https_timeout_secs)
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref level) = self.log_level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::Invalid(format!("Invalid log level: {}", level)));
            }
        }

        if let Some(ref nameserver) = self.nameserver {
            let valid = nameserver.parse::<SocketAddr>().is_ok()
                || nameserver.parse::<IpAddr>().is_ok();
            if !valid {
                return Err(ConfigError::Invalid(format!(
                    "Invalid name server: {}",
                    nameserver
                )));
            }
        }

        if self.lookup_timeout_secs == 0 || self.https_timeout_secs == 0 {
            return Err(ConfigError::Invalid("Timeouts cannot be 0".to_string()));
        }

        if self.max_concurrent_lookups == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_lookups cannot be 0".to_string(),
            ));
        }

        if self.max_chain_depth == 0 {
            return Err(ConfigError::Invalid("max_chain_depth cannot be 0".to_string()));
        }

        if self.policy.registry_domains.iter().any(|d| d.trim().is_empty()) {
            return Err(ConfigError::Invalid("Empty registry domain".to_string()));
        }

        Ok(())
    }
}
