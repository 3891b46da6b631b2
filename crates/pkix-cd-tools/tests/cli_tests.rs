//! Exit code and output tests for the command-line tools
//!
//! None of these cases reach the network: registry and live checks are only
//! exercised for non-registry certificates, and the manage tool runs on access
//! lists with no valid identities.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

const TRUST_MAP: &str = r#"{"SSID1": {"my._device.example.com": ["aa-bb-cc"]}}"#;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../pkix-cd-proto/tests/fixtures")
        .join(name)
}

fn write_trust_map(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("trustmap.json");
    fs::write(&path, TRUST_MAP).unwrap();
    path
}

fn verify(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pkix_cd_verify"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run pkix_cd_verify")
}

fn verify_with(called: &str, calling: &str, certfile: &PathBuf, trustmap: &PathBuf) -> Output {
    verify(&[
        "--called",
        called,
        "--calling",
        calling,
        "--certfile",
        certfile.to_str().unwrap(),
        "--trustmap",
        trustmap.to_str().unwrap(),
    ])
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_accepted_exits_zero() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let output = verify_with(
        "NAS:SSID1",
        "my._device.example.com",
        &fixture("device.cert.pem"),
        &trustmap,
    );
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert!(stdout(&output).contains("accepted"));
}

#[test]
fn test_missing_trust_map_exits_one() {
    let dir = TempDir::new().unwrap();
    let output = verify_with(
        "NAS:SSID1",
        "my._device.example.com",
        &fixture("device.cert.pem"),
        &dir.path().join("absent.json"),
    );
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_missing_certificate_exits_two() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let output = verify_with(
        "NAS:SSID1",
        "my._device.example.com",
        &dir.path().join("absent.pem"),
        &trustmap,
    );
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_unknown_access_point_exits_three() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let certfile = fixture("device.cert.pem");

    let unknown = verify_with("NAS:UNKNOWNSSID", "my._device.example.com", &certfile, &trustmap);
    assert_eq!(unknown.status.code(), Some(3));

    let malformed = verify_with("SSID1", "my._device.example.com", &certfile, &trustmap);
    assert_eq!(malformed.status.code(), Some(3));
}

#[test]
fn test_authority_mismatch_exits_four() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let output = verify_with(
        "NAS:SSID1",
        "my._device.example.com",
        &fixture("impostor.cert.pem"),
        &trustmap,
    );
    assert_eq!(output.status.code(), Some(4));
    assert!(stdout(&output).contains("dd-ee-ff"));
}

#[test]
fn test_require_registry_exits_six() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let output = verify(&[
        "--called",
        "NAS:SSID1",
        "--calling",
        "my._device.example.com",
        "--certfile",
        fixture("device.cert.pem").to_str().unwrap(),
        "--trustmap",
        trustmap.to_str().unwrap(),
        "--require-registry",
    ]);
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn test_unauthorized_identity_exits_seven() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let output = verify_with(
        "NAS:SSID1",
        "stranger._device.example.com",
        &fixture("device.cert.pem"),
        &trustmap,
    );
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn test_advisory_policy_from_config() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let config = dir.path().join("config.json");
    let audit = dir.path().join("audit.log");
    fs::write(
        &config,
        format!(
            r#"{{"policy": {{"unauthorized_identity": "advisory"}}, "audit_log_path": "{}"}}"#,
            audit.display()
        ),
    )
    .unwrap();

    let output = verify(&[
        "--called",
        "NAS:SSID1",
        "--calling",
        "stranger._device.example.com",
        "--certfile",
        fixture("device.cert.pem").to_str().unwrap(),
        "--trustmap",
        trustmap.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(4));

    let log = fs::read_to_string(&audit).unwrap();
    assert!(log.contains("authority_key_mismatch"));
    assert!(log.contains("stranger._device.example.com"));
}

#[test]
fn test_invalid_config_is_setup_failure() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"max_chain_depth": 0}"#).unwrap();

    let output = verify(&[
        "--called",
        "NAS:SSID1",
        "--calling",
        "my._device.example.com",
        "--certfile",
        fixture("device.cert.pem").to_str().unwrap(),
        "--trustmap",
        trustmap.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn test_usage_error_is_setup_failure() {
    let output = verify(&["--called", "NAS:SSID1", "--certfile", "device.pem"]);
    assert_eq!(output.status.code(), Some(64));
    assert!(output.stdout.is_empty());
}

#[test]
fn test_trailing_root_dot_on_identity() {
    let dir = TempDir::new().unwrap();
    let trustmap = write_trust_map(&dir);
    let output = verify_with(
        "NAS:SSID1",
        "my._device.example.com.",
        &fixture("device.cert.pem"),
        &trustmap,
    );
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
}

#[test]
fn test_manage_trust_without_identities() {
    let dir = TempDir::new().unwrap();
    let infile = dir.path().join("access.txt");
    let trustmap = dir.path().join("trustmap.json");
    let cacerts = dir.path().join("ca.pem");
    fs::write(&infile, "\nno-separator\nSSID1|10.0.0.1\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_pkix_cd_manage_trust"))
        .args([
            "--infile",
            infile.to_str().unwrap(),
            "--trustmap",
            trustmap.to_str().unwrap(),
            "--cacerts",
            cacerts.to_str().unwrap(),
            "--ns_override",
            "127.0.0.1:53",
        ])
        .output()
        .expect("Failed to run pkix_cd_manage_trust");

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output).trim(), "No update to trust store file.");
    // Missing bundle is created even when the map is unchanged
    assert!(cacerts.exists());
    assert!(!trustmap.exists());
}

#[test]
fn test_manage_trust_missing_infile() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_pkix_cd_manage_trust"))
        .args([
            "--infile",
            dir.path().join("absent.txt").to_str().unwrap(),
            "--trustmap",
            dir.path().join("trustmap.json").to_str().unwrap(),
            "--cacerts",
            dir.path().join("ca.pem").to_str().unwrap(),
        ])
        .output()
        .expect("Failed to run pkix_cd_manage_trust");
    assert_eq!(output.status.code(), Some(1));
}
