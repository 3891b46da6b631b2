//! Command-line tools for RADIUS with PKIX-CD
//!
//! Shared plumbing for the two binaries built on `pkix-cd-proto`:
//!
//! - `pkix_cd_manage_trust`: access list → trust map + CA bundle
//! - `pkix_cd_verify`: one supplicant decision, reported as an exit code
//!
//! # Features
//!
//! - JSON configuration with defaults for every field
//! - JSON-lines audit log of decisions and trust store updates
//! - Logging via `tracing` with `RUST_LOG` override

pub mod audit;
pub mod config;

pub use audit::{AuditEntry, AuditEventType, AuditLogger};
pub use config::{Config, ConfigError};

use pkix_cd_proto::{DnsIdentityResolver, IdentityResolver, ResolutionError};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit code for usage, configuration and audit log errors in `pkix_cd_verify`,
/// outside the range of verification outcomes
pub const EXIT_SETUP_FAILURE: i32 = 64;

/// Initialize tracing; `RUST_LOG` overrides `level`
///
/// Log lines go to stderr so stdout carries only the tool's summary line.
pub fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// DNS/HTTPS resolver from configuration plus an optional `--ns_override`
pub fn build_resolver(
    config: &Config,
    ns_override: Option<&str>,
) -> Result<Arc<dyn IdentityResolver>, ResolutionError> {
    let resolver = DnsIdentityResolver::new(&config.resolver_config(ns_override))?;
    Ok(Arc::new(resolver))
}
