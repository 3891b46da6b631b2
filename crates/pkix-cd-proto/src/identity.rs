//! Device identity names
//!
//! A device identity is a DNS name such as `my._device.example.com`. Labels
//! follow RFC 1123 with the underscore allowed (PKIX-CD names carry a
//! `_device` label). Names that look like IPv4 addresses are rejected.

use crate::error::IdentityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a DNS name in presentation form
pub const MAX_NAME_LEN: usize = 255;

/// Opaque access point identifier (SSID or Called-Station-Id suffix)
pub type AccessPointId = String;

/// A validated device identity
///
/// The trailing root dot is stripped so `a.example.com.` and `a.example.com`
/// refer to the same identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Validate and wrap a DNS name
    pub fn parse(name: &str) -> Result<Self, IdentityError> {
        let name = validate_dns_name(name)?;
        Ok(DeviceIdentity(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceIdentity::parse(s)
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DeviceIdentity::parse(&value)
    }
}

impl From<DeviceIdentity> for String {
    fn from(identity: DeviceIdentity) -> Self {
        identity.0
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a DNS name against RFC 1123 label rules
///
/// Returns the name with trailing dots removed.
pub fn validate_dns_name(dns_name: &str) -> Result<&str, IdentityError> {
    let name = strip_root(dns_name);
    if name.is_empty() {
        return Err(IdentityError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(IdentityError::TooLong(name.to_string()));
    }
    if is_ipv4_address(name) {
        return Err(IdentityError::IpAddress(name.to_string()));
    }

    for label in name.split('.') {
        if !is_valid_label(label) {
            return Err(IdentityError::InvalidLabel {
                name: name.to_string(),
                label: label.to_string(),
            });
        }
    }

    Ok(name)
}

/// Remove trailing root dots from a name
pub fn strip_root(name: &str) -> &str {
    name.trim_end_matches('.')
}

/// True if `name` is a dotted quad of decimal octets
pub fn is_ipv4_address(name: &str) -> bool {
    let octets: Vec<&str> = name.split('.').collect();
    octets.len() == 4
        && octets.iter().all(|octet| {
            !octet.is_empty()
                && octet.len() <= 3
                && octet.bytes().all(|b| b.is_ascii_digit())
                && octet.parse::<u16>().map_or(false, |v| v <= 255)
        })
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
