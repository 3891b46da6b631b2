//! Error types for trust map construction and verification
//!
//! Batch errors (access-list lines, per-identity discovery) are recoverable and
//! logged by the caller. Persistence failures on save are fatal. Verification
//! failures are not errors at all: they are terminal [`crate::verify::Outcome`]s.

use std::path::PathBuf;

/// A device identity failed DNS-name validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Empty name (or only a trailing dot)
    #[error("identity name is empty")]
    Empty,

    /// Longer than 255 characters
    #[error("'{0}' exceeds 255 characters")]
    TooLong(String),

    /// The name parses as a dotted-quad IPv4 address
    #[error("'{0}' is a bad hostname (is it an IP address?)")]
    IpAddress(String),

    /// A label is empty or contains characters outside `[A-Za-z0-9_-]`
    #[error("'{name}' is a bad hostname (invalid label '{label}')")]
    InvalidLabel { name: String, label: String },
}

/// Problems reading the access list
#[derive(Debug, thiserror::Error)]
pub enum AccessListError {
    /// Line does not split into exactly two `|`-separated fields
    #[error("Incorrectly formatted line: {line}")]
    Parse { line: usize },

    /// Device identity on the line failed validation
    #[error("Bad ID name on line {line}: {source}")]
    Validation {
        line: usize,
        #[source]
        source: IdentityError,
    },

    /// The access list itself could not be read
    #[error("Failed to read access list: {0}")]
    Io(#[from] std::io::Error),
}

impl AccessListError {
    /// 1-based line number of a per-line diagnostic
    pub fn line(&self) -> Option<usize> {
        match self {
            AccessListError::Parse { line } | AccessListError::Validation { line, .. } => {
                Some(*line)
            }
            AccessListError::Io(_) => None,
        }
    }
}

/// Certificate decoding and metadata extraction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate PEM: {0}")]
    Pem(String),

    #[error("Failed to parse certificate: {0}")]
    Der(String),

    #[error("Certificate has no Authority Key Identifier")]
    MissingAuthorityKeyId,

    #[error("Certificate has no subject common name")]
    MissingCommonName,

    #[error("Certificate signature invalid: {0}")]
    InvalidSignature(String),
}

/// Discovery failure for one identity
///
/// All variants are recoverable during trust map construction: the identity is
/// skipped. During verification they count as a failed check.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolutionError {
    /// No usable records were published for the name
    #[error("No TLSA records for {0}")]
    NoRecords(String),

    /// Records were published but could not be interpreted
    #[error("Malformed TLSA records for {name}: {reason}")]
    MalformedRecords { name: String, reason: String },

    /// Lookup did not complete within the configured bound
    #[error("Lookup for {name} timed out after {secs}s")]
    Timeout { name: String, secs: u64 },

    /// DNS or HTTPS transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// A retrieved certificate could not be decoded
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// No CA certificate was published for an authority key identifier
    #[error("No CA certificate for authority key {0}")]
    NoCaCertificate(String),

    /// Chain walk did not reach a self-issued certificate
    #[error("Trust chain for {name} exceeds {max_depth} certificates")]
    ChainTooDeep { name: String, max_depth: usize },
}

/// Trust store file errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Trust store {path} is not a valid trust map: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the file simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PersistenceError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}
