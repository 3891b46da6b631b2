//! Audit logging for trust store updates and verification decisions
//!
//! One JSON object per line, appended to the configured file.

use pkix_cd_proto::Decision;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// Audit event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Supplicant accepted
    VerifyAccepted,
    /// Supplicant rejected
    VerifyRejected,
    /// Trust store rewritten by discovery
    TrustStoreUpdated,
    /// Discovery found nothing new
    TrustStoreUnchanged,
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Timestamp (Unix epoch seconds)
    pub timestamp: u64,
    /// ISO 8601 formatted timestamp
    pub timestamp_iso: String,
    pub event_type: AuditEventType,
    /// Called-Station-Id as presented
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_station: Option<String>,
    /// Claimed device identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub tool_version: String,
}

impl AuditEntry {
    /// Create a new audit entry
    pub fn new(event_type: AuditEventType) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let timestamp = now.as_secs();
        let timestamp_iso = chrono::DateTime::from_timestamp(timestamp as i64, 0)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        AuditEntry {
            timestamp,
            timestamp_iso,
            event_type,
            called_station: None,
            identity: None,
            outcome: None,
            exit_code: None,
            details: None,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Entry for a verification decision
    pub fn for_decision(decision: &Decision) -> Self {
        let event_type = if decision.outcome.is_accepted() {
            AuditEventType::VerifyAccepted
        } else {
            AuditEventType::VerifyRejected
        };
        let mut entry = AuditEntry::new(event_type).with_details(decision.reason.clone());
        entry.outcome = Some(decision.outcome.to_string());
        entry.exit_code = Some(decision.exit_code());
        entry
    }

    pub fn with_called_station(mut self, called_station: impl Into<String>) -> Self {
        self.called_station = Some(called_station.into());
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Append-only JSON-lines audit log; a no-op without a configured path
pub struct AuditLogger {
    file: Option<File>,
}

impl AuditLogger {
    pub fn open(path: Option<&str>) -> std::io::Result<Self> {
        let file = path
            .map(|path| OpenOptions::new().create(true).append(true).open(path))
            .transpose()?;
        Ok(AuditLogger { file })
    }

    /// Write failures are logged, never fatal to the tool
    pub fn log(&mut self, entry: &AuditEntry) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        match serde_json::to_string(entry) {
            Ok(json) => {
                if let Err(e) = writeln!(file, "{}", json) {
                    error!("Failed to write audit log: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize audit entry: {}", e),
        }
    }
}
