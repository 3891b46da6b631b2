//! Network access list loading
//!
//! The access list is pipe-delimited, one entry per line:
//!
//! ```text
//! SSID1|my._device.example.com
//! SSID2|my._device.example.com
//! ```
//!
//! Entries are organized by device identity: each identity maps to every access
//! point (Called-Station-Id) it may use. Malformed lines are reported and
//! skipped; they never abort the load.

use crate::error::AccessListError;
use crate::identity::{AccessPointId, DeviceIdentity};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::warn;

/// Field separator in the access list
pub const FIELD_SEPARATOR: char = '|';

/// Access points permitted per device identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessConfig {
    by_identity: BTreeMap<DeviceIdentity, Vec<AccessPointId>>,
}

/// Result of loading an access list: the entries plus one diagnostic per skipped line
#[derive(Debug, Default)]
pub struct AccessConfigLoad {
    pub config: AccessConfig,
    pub diagnostics: Vec<AccessListError>,
}

impl AccessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an access list file
    ///
    /// Only failure to open or read the file is an error. Per-line problems are
    /// returned as diagnostics.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AccessConfigLoad, AccessListError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse an access list from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<AccessConfigLoad, AccessListError> {
        let mut load = AccessConfigLoad::default();
        for (index, line) in reader.lines().enumerate() {
            load.add_line(index + 1, &line?);
        }
        Ok(load)
    }

    /// Parse an access list held in memory
    pub fn parse_str(contents: &str) -> AccessConfigLoad {
        let mut load = AccessConfigLoad::default();
        for (index, line) in contents.lines().enumerate() {
            load.add_line(index + 1, line);
        }
        load
    }

    /// Permit `identity` at `access_point`
    pub fn insert(&mut self, access_point: impl Into<AccessPointId>, identity: DeviceIdentity) {
        self.by_identity
            .entry(identity)
            .or_default()
            .push(access_point.into());
    }

    /// Access points listed for an identity, in file order (duplicates kept)
    pub fn access_points(&self, identity: &DeviceIdentity) -> &[AccessPointId] {
        self.by_identity
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn identities(&self) -> impl Iterator<Item = &DeviceIdentity> {
        self.by_identity.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceIdentity, &[AccessPointId])> {
        self.by_identity.iter().map(|(id, aps)| (id, aps.as_slice()))
    }

    /// True if the list contains the (access point, identity) entry
    pub fn permits(&self, access_point: &str, identity: &DeviceIdentity) -> bool {
        self.access_points(identity).iter().any(|ap| ap == access_point)
    }

    /// Number of distinct identities
    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}

impl AccessConfigLoad {
    fn add_line(&mut self, line_no: usize, raw: &str) {
        match parse_line(line_no, raw) {
            Ok(Some((access_point, identity))) => self.config.insert(access_point, identity),
            Ok(None) => {}
            Err(err) => {
                warn!("{}", err);
                self.diagnostics.push(err);
            }
        }
    }
}

/// Parse one access-list line
///
/// Returns `Ok(None)` for blank lines.
pub fn parse_line(
    line_no: usize,
    raw: &str,
) -> Result<Option<(AccessPointId, DeviceIdentity)>, AccessListError> {
    let line = raw
        .trim_end_matches(['\n', '\r'])
        .trim_matches(' ');
    if line.is_empty() {
        return Ok(None);
    }

    let mut fields = line.split(FIELD_SEPARATOR);
    let (access_point, identity) = match (fields.next(), fields.next(), fields.next()) {
        (Some(access_point), Some(identity), None) => (access_point, identity),
        _ => return Err(AccessListError::Parse { line: line_no }),
    };

    let identity = DeviceIdentity::parse(identity).map_err(|source| AccessListError::Validation {
        line: line_no,
        source,
    })?;

    Ok(Some((access_point.to_string(), identity)))
}
