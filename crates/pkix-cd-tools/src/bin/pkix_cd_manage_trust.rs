use clap::Parser;
use pkix_cd_proto::{write_ca_bundle, AccessConfig, TrustDiscovery, TrustMap};
use pkix_cd_tools::{build_resolver, init_logging, AuditEntry, AuditEventType, AuditLogger, Config};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};

const ABOUT: &str = "Manage the trust map and CA bundle for pkix_cd_verify.

The access list is pipe delimited:

    CalledStation|my._device.example.com

where CalledStation is the Called-Station-Id and my._device.example.com is
the device allowed to use it. Devices may be listed for several stations.";

/// Build the PKIX-CD trust map from a network access list
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = ABOUT)]
#[command(name = "pkix_cd_manage_trust")]
struct Cli {
    /// Network access list
    #[arg(long, value_name = "FILE")]
    infile: PathBuf,

    /// Trust map output, read by pkix_cd_verify
    #[arg(long, value_name = "FILE")]
    trustmap: PathBuf,

    /// CA certificate bundle output
    #[arg(long, value_name = "FILE")]
    cacerts: PathBuf,

    /// Override the system name server (IP or IP:port)
    #[arg(long = "ns_override", value_name = "SERVER")]
    ns_override: Option<String>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load_optional(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };
    init_logging(config.log_level());

    let mut audit = match AuditLogger::open(config.audit_log_path.as_deref()) {
        Ok(audit) => audit,
        Err(e) => {
            error!("Cannot open audit log: {}", e);
            process::exit(1);
        }
    };

    let access = match AccessConfig::load(&cli.infile) {
        Ok(load) => load,
        Err(e) => {
            error!("{}: {}", cli.infile.display(), e);
            process::exit(1);
        }
    };
    info!(
        "Loaded {} identities from {} ({} lines skipped)",
        access.config.len(),
        cli.infile.display(),
        access.diagnostics.len()
    );

    let resolver = match build_resolver(&config, cli.ns_override.as_deref()) {
        Ok(resolver) => resolver,
        Err(e) => {
            error!("Cannot create resolver: {}", e);
            process::exit(1);
        }
    };

    let prior = TrustMap::load_or_empty(&cli.trustmap);
    let engine = TrustDiscovery::new(resolver, config.discovery_config());
    let mut report = engine.discover(&access.config).await;
    report.carry_forward(&prior, &access.config);

    let changed = match report.trust_map.save_if_changed(&cli.trustmap) {
        Ok(changed) => changed,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if changed || !cli.cacerts.exists() {
        if !report.failures.is_empty() {
            warn!(
                "CA bundle omits roots for {} unresolved identities",
                report.failures.len()
            );
        }
        if let Err(e) = write_ca_bundle(&cli.cacerts, &report.ca_bundle.to_pems()) {
            error!("{}", e);
            process::exit(1);
        }
    }

    let (event, summary) = if changed {
        (AuditEventType::TrustStoreUpdated, "Updated trust store file.")
    } else {
        (AuditEventType::TrustStoreUnchanged, "No update to trust store file.")
    };
    audit.log(&AuditEntry::new(event).with_details(format!(
        "{} identities, {} unresolved, {} CA certificates",
        access.config.len(),
        report.failures.len(),
        report.ca_bundle.len()
    )));

    println!("{}", summary);
}
