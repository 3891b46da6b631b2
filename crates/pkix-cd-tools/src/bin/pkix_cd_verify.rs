use clap::Parser;
use pkix_cd_proto::{Verifier, VerifyOptions, VerifyRequest};
use pkix_cd_tools::{
    build_resolver, init_logging, AuditEntry, AuditLogger, Config, EXIT_SETUP_FAILURE,
};
use std::path::PathBuf;
use std::process;
use tracing::{debug, error, warn};

const ABOUT: &str = "Authorize a supplicant against the trust map, using PKIX-CD for
identity to trust anchor mapping.

Exit codes:
  0  accepted
  1  missing trust map
  2  missing certificate file
  3  invalid called-station-id
  4  authority key mismatch (possible impersonation)
  5  live verification failed
  6  registry check failed
  7  identity not authorized for the called station
  64 usage, configuration or audit log error; no decision was made";

/// Verify a supplicant certificate against the PKIX-CD trust map
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = ABOUT)]
#[command(name = "pkix_cd_verify")]
struct Cli {
    /// Called-Station-Id, `<prefix>:<ssid>`
    #[arg(long, value_name = "ID")]
    called: String,

    /// Calling-Station-Id, the device identity
    #[arg(long, value_name = "IDENTITY")]
    calling: String,

    /// Certificate presented by the supplicant (PEM)
    #[arg(long, value_name = "FILE")]
    certfile: PathBuf,

    /// Trust map written by pkix_cd_manage_trust
    #[arg(long, value_name = "FILE")]
    trustmap: PathBuf,

    /// Also verify directly against DNS, bypassing the trust map cache
    #[arg(long = "live-verify")]
    live_verify: bool,

    /// Require registry issuance and a clean revocation check
    #[arg(long = "require-registry")]
    require_registry: bool,

    /// Override the system name server (IP or IP:port)
    #[arg(long = "ns_override", value_name = "SERVER")]
    ns_override: Option<String>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            process::exit(EXIT_SETUP_FAILURE);
        }
    };

    let config = match Config::load_optional(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(EXIT_SETUP_FAILURE);
        }
    };
    init_logging(config.log_level());

    let mut audit = match AuditLogger::open(config.audit_log_path.as_deref()) {
        Ok(audit) => audit,
        Err(e) => {
            error!("Cannot open audit log: {}", e);
            process::exit(EXIT_SETUP_FAILURE);
        }
    };

    let mut verifier =
        Verifier::new(config.policy.clone()).with_lookup_timeout(config.verify_timeout());
    // Without a resolver, live and registry checks fail closed
    match build_resolver(&config, cli.ns_override.as_deref()) {
        Ok(resolver) => verifier = verifier.with_resolver(resolver),
        Err(e) if cli.live_verify || cli.require_registry => {
            warn!("Cannot create resolver: {}", e)
        }
        Err(e) => debug!("Cannot create resolver: {}", e),
    }

    let request = VerifyRequest {
        called_station: cli.called.clone(),
        identity: cli.calling.clone(),
        certificate_path: cli.certfile.clone(),
        trust_map_path: cli.trustmap.clone(),
    };
    let options = VerifyOptions {
        live_verify: cli.live_verify,
        require_registry: cli.require_registry,
    };
    let decision = verifier.verify(&request, options).await;

    audit.log(
        &AuditEntry::for_decision(&decision)
            .with_called_station(cli.called)
            .with_identity(cli.calling),
    );

    println!("{}", decision.reason);
    process::exit(decision.exit_code());
}
