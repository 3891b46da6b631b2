//! Trust map model and persistence
//!
//! The trust map binds access points to device identities and, per identity,
//! to the authority key identifiers (and optionally certificate digests) that
//! are accepted for it:
//!
//! ```json
//! {"SSID1": {"my._device.example.com": ["aa-bb-cc"]}}
//! {"SSID1": {"my._device.example.com": {"akis": ["aa-bb-cc"], "cert_hashes": ["8c4d..."]}}}
//! ```
//!
//! Both shapes are read; the entry variant decides the matching rule. Maps and
//! sets are ordered, so serialization is deterministic and equality ignores the
//! order values were discovered in.
//!
//! Files are replaced atomically (temp file in the same directory, then
//! rename) so a verifier never observes a partial write.

use crate::cert::{AuthorityKeyId, Certificate, CertificateDigest};
use crate::config::DigestMatch;
use crate::error::PersistenceError;
use crate::identity::AccessPointId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Accepted trust anchors for one (access point, identity) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrustEntry {
    /// Plain list of authority key identifiers
    Simple(BTreeSet<AuthorityKeyId>),

    /// Authority key identifiers plus certificate digests
    Extended {
        #[serde(default)]
        akis: BTreeSet<AuthorityKeyId>,
        #[serde(default)]
        cert_hashes: BTreeSet<CertificateDigest>,
    },
}

impl TrustEntry {
    pub fn simple(akis: impl IntoIterator<Item = AuthorityKeyId>) -> Self {
        TrustEntry::Simple(akis.into_iter().collect())
    }

    pub fn extended(
        akis: impl IntoIterator<Item = AuthorityKeyId>,
        cert_hashes: impl IntoIterator<Item = CertificateDigest>,
    ) -> Self {
        TrustEntry::Extended {
            akis: akis.into_iter().collect(),
            cert_hashes: cert_hashes.into_iter().collect(),
        }
    }

    pub fn akis(&self) -> &BTreeSet<AuthorityKeyId> {
        match self {
            TrustEntry::Simple(akis) | TrustEntry::Extended { akis, .. } => akis,
        }
    }

    pub fn cert_hashes(&self) -> Option<&BTreeSet<CertificateDigest>> {
        match self {
            TrustEntry::Simple(_) => None,
            TrustEntry::Extended { cert_hashes, .. } => Some(cert_hashes),
        }
    }

    /// Decide whether a presented certificate's AKI/digest is accepted
    ///
    /// Simple entries match on AKI only. Extended entries combine AKI and
    /// digest per `digest_match`.
    pub fn accepts(
        &self,
        aki: Option<&AuthorityKeyId>,
        digest: &CertificateDigest,
        digest_match: DigestMatch,
    ) -> bool {
        let aki_ok = aki.map_or(false, |aki| self.akis().contains(aki));
        match self.cert_hashes() {
            None => aki_ok,
            Some(hashes) => {
                let digest_ok = hashes.contains(digest);
                match digest_match {
                    DigestMatch::Alternative => aki_ok || digest_ok,
                    DigestMatch::Required => aki_ok && digest_ok,
                }
            }
        }
    }
}

/// Access point -> device identity -> accepted trust anchors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustMap {
    realms: BTreeMap<AccessPointId, BTreeMap<String, TrustEntry>>,
}

impl TrustMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry for one pair, replacing any prior value
    pub fn insert(
        &mut self,
        access_point: impl Into<AccessPointId>,
        identity: impl Into<String>,
        entry: TrustEntry,
    ) {
        self.realms
            .entry(access_point.into())
            .or_default()
            .insert(identity.into(), entry);
    }

    pub fn contains_access_point(&self, access_point: &str) -> bool {
        self.realms.contains_key(access_point)
    }

    /// Identities listed under an access point
    pub fn identities(&self, access_point: &str) -> Option<&BTreeMap<String, TrustEntry>> {
        self.realms.get(access_point)
    }

    pub fn get(&self, access_point: &str, identity: &str) -> Option<&TrustEntry> {
        self.realms.get(access_point)?.get(identity)
    }

    pub fn access_points(&self) -> impl Iterator<Item = &AccessPointId> {
        self.realms.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccessPointId, &str, &TrustEntry)> {
        self.realms.iter().flat_map(|(ap, identities)| {
            identities
                .iter()
                .map(move |(identity, entry)| (ap, identity.as_str(), entry))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }

    /// Read a trust map; a missing file or invalid JSON is an error
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
        serde_json::from_str(&contents).map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a trust map, treating a missing or corrupt file as empty
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(map) => map,
            Err(e) if e.is_not_found() => {
                debug!("No trust store at {}, starting empty", path.as_ref().display());
                Self::default()
            }
            Err(e) => {
                warn!("{}; treating as empty", e);
                Self::default()
            }
        }
    }

    /// Deterministic JSON encoding
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Write the trust map unless the file already holds an equal one
    ///
    /// Returns `true` if the file was written.
    pub fn save_if_changed<P: AsRef<Path>>(&self, path: P) -> Result<bool, PersistenceError> {
        let path = path.as_ref();
        let current = Self::load_or_empty(path);
        if current == *self {
            debug!("Trust store at {} unchanged", path.display());
            return Ok(false);
        }

        let json = self.to_json().map_err(|source| PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomic(path, json.as_bytes())?;
        info!("Updated trust store at {}", path.display());
        Ok(true)
    }
}

/// Distinct root certificates collected during one discovery run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaBundle {
    certificates: BTreeSet<Certificate>,
}

impl CaBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root; returns false if it was already present
    pub fn insert(&mut self, certificate: Certificate) -> bool {
        self.certificates.insert(certificate)
    }

    pub fn extend(&mut self, other: CaBundle) {
        self.certificates.extend(other.certificates);
    }

    pub fn contains(&self, certificate: &Certificate) -> bool {
        self.certificates.contains(certificate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.iter()
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn to_pems(&self) -> Vec<String> {
        self.certificates.iter().map(Certificate::to_pem).collect()
    }
}

/// Overwrite the CA bundle file with the given PEM blocks joined by newline
pub fn write_ca_bundle<P: AsRef<Path>>(path: P, pems: &[String]) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    write_atomic(path, pems.join("\n").as_bytes())?;
    info!("Wrote {} CA certificate(s) to {}", pems.len(), path.display());
    Ok(())
}

/// Replace `path` with `contents` via a sibling temp file and rename
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PersistenceError::io(tmp.path(), e))?;
    // Readable by the RADIUS server, not just the batch user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
            .map_err(|e| PersistenceError::io(tmp.path(), e))?;
    }
    tmp.persist(path).map_err(|e| PersistenceError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
