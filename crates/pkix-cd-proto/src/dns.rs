//! DNS/HTTPS-backed identity resolver
//!
//! TLSA records come from DNS via `hickory-resolver`, optionally through a
//! specific name server and with DNSSEC validation. CA certificates are
//! fetched over HTTPS from the identity's domain:
//!
//! ```text
//! identity:  <host>._device.<domain>
//! CA by AKI: https://device.<domain>/ca/<aki>.pem
//! ```

use crate::cert::{AuthorityKeyId, Certificate};
use crate::discovery::{IdentityResolver, TlsaRecord, DEFAULT_MAX_CHAIN_DEPTH};
use crate::error::ResolutionError;
use crate::identity::DeviceIdentity;
use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// Label separating a device host from its domain
pub const DEVICE_LABEL: &str = "_device";

const DNS_PORT: u16 = 53;

/// Largest CA certificate accepted over HTTPS
const MAX_CA_CERT_BYTES: usize = 64 * 1024;

/// Settings for [`DnsIdentityResolver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsResolverConfig {
    /// Name server override, `IP` or `IP:port`; system configuration when unset
    pub nameserver: Option<String>,
    pub dns_timeout: Duration,
    pub https_timeout: Duration,
    pub max_chain_depth: usize,
    /// Require DNSSEC-validated answers
    pub require_dnssec: bool,
}

impl Default for DnsResolverConfig {
    fn default() -> Self {
        Self {
            nameserver: None,
            dns_timeout: Duration::from_secs(5),
            https_timeout: Duration::from_secs(5),
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            require_dnssec: false,
        }
    }
}

/// Identity resolver over live DNS and HTTPS
pub struct DnsIdentityResolver {
    dns: TokioAsyncResolver,
    http: reqwest::Client,
    dns_timeout: Duration,
    max_chain_depth: usize,
}

impl DnsIdentityResolver {
    pub fn new(config: &DnsResolverConfig) -> Result<Self, ResolutionError> {
        let (resolver_config, mut opts) = match &config.nameserver {
            Some(nameserver) => {
                let addr = parse_nameserver(nameserver)?;
                let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
                (
                    ResolverConfig::from_parts(None, vec![], group),
                    ResolverOpts::default(),
                )
            }
            None => hickory_resolver::system_conf::read_system_conf()
                .map_err(|e| ResolutionError::Transport(format!("System resolver: {}", e)))?,
        };
        opts.timeout = config.dns_timeout;
        opts.validate = config.require_dnssec;

        let http = reqwest::Client::builder()
            .timeout(config.https_timeout)
            .build()
            .map_err(|e| ResolutionError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            dns: TokioAsyncResolver::tokio(resolver_config, opts),
            http,
            dns_timeout: config.dns_timeout,
            max_chain_depth: config.max_chain_depth,
        })
    }
}

#[async_trait]
impl IdentityResolver for DnsIdentityResolver {
    async fn tlsa_records(&self, dns_name: &str) -> Result<Vec<TlsaRecord>, ResolutionError> {
        let fqdn = format!("{}.", dns_name.trim_end_matches('.'));
        let lookup = self
            .dns
            .lookup(fqdn.as_str(), RecordType::TLSA)
            .await
            .map_err(|e| resolve_error(dns_name, e, self.dns_timeout))?;

        let records: Vec<TlsaRecord> = lookup
            .iter()
            .filter_map(|rdata| match rdata {
                RData::TLSA(tlsa) => Some(TlsaRecord::new(
                    u8::from(tlsa.cert_usage()),
                    u8::from(tlsa.selector()),
                    u8::from(tlsa.matching()),
                    tlsa.cert_data().to_vec(),
                )),
                _ => None,
            })
            .collect();
        debug!("{}: {} TLSA record(s)", dns_name, records.len());
        Ok(records)
    }

    async fn ca_certificate(
        &self,
        identity: &DeviceIdentity,
        authority_key_id: &AuthorityKeyId,
    ) -> Result<Certificate, ResolutionError> {
        let url = ca_certificate_url(identity, authority_key_id).ok_or_else(|| {
            ResolutionError::NoCaCertificate(format!(
                "{} ({} has no {} label)",
                authority_key_id, identity, DEVICE_LABEL
            ))
        })?;
        debug!("Fetching CA certificate {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolutionError::Transport(format!("{}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(ResolutionError::NoCaCertificate(format!(
                "{} (HTTP {} from {})",
                authority_key_id,
                response.status(),
                url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ResolutionError::Transport(format!("{}: {}", url, e)))?;
        if body.len() > MAX_CA_CERT_BYTES {
            return Err(ResolutionError::Transport(format!(
                "{}: response too large ({} bytes)",
                url,
                body.len()
            )));
        }
        let pem = String::from_utf8_lossy(&body);
        Ok(Certificate::from_pem(&pem)?)
    }

    fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }
}

/// `https://device.<domain>/ca/<aki>.pem` for `<host>._device.<domain>`
pub fn ca_certificate_url(identity: &DeviceIdentity, authority_key_id: &AuthorityKeyId) -> Option<String> {
    let separator = format!(".{}.", DEVICE_LABEL);
    let (_, domain) = identity.as_str().split_once(separator.as_str())?;
    Some(format!("https://device.{}/ca/{}.pem", domain, authority_key_id))
}

fn parse_nameserver(nameserver: &str) -> Result<SocketAddr, ResolutionError> {
    if let Ok(addr) = nameserver.parse::<SocketAddr>() {
        return Ok(addr);
    }
    nameserver
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ResolutionError::Transport(format!("Invalid name server '{}'", nameserver)))
}

fn resolve_error(name: &str, error: ResolveError, timeout: Duration) -> ResolutionError {
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => ResolutionError::NoRecords(name.to_string()),
        ResolveErrorKind::Timeout => ResolutionError::Timeout {
            name: name.to_string(),
            secs: timeout.as_secs(),
        },
        _ => ResolutionError::Transport(format!("{}: {}", name, error)),
    }
}
