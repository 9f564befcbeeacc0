//! Normalized MAC addresses.
//!
//! Discovery compares hardware addresses captured off the wire with
//! addresses stored on node NICs, so every address is normalized to
//! lowercase, colon-separated form regardless of how it was written.

use std::fmt;
use std::str::FromStr;

use macaddr::MacAddr6;
use serde::{Deserialize, Serialize};

/// A 48-bit hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The all-ones broadcast address.
    pub const BROADCAST: Self = Self([0xff; 6]);

    /// Create a MAC address from raw octets.
    #[must_use]
    pub const fn from_octets(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Return the raw octets.
    #[must_use]
    pub const fn octets(&self) -> &[u8; 6] {
        &self.0
    }

    /// Returns true for the broadcast address.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns true when the group bit is set (multicast or broadcast).
    #[must_use]
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// Format with a custom separator, e.g. `-` for PXE configuration file names.
    #[must_use]
    pub fn to_string_with(&self, separator: &str) -> String {
        let hex = hex::encode(self.0);
        let pairs: Vec<&str> = (0..6).map(|i| &hex[i * 2..i * 2 + 2]).collect();
        pairs.join(separator)
    }
}

impl From<MacAddr6> for MacAddress {
    fn from(addr: MacAddr6) -> Self {
        Self(addr.into_array())
    }
}

impl From<MacAddress> for MacAddr6 {
    fn from(addr: MacAddress) -> Self {
        MacAddr6::from(addr.0)
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff`, `aabb.ccdd.eeff`
    /// and bare `aabbccddeeff`, in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() == 12 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            let bytes = hex::decode(s).map_err(|_| MacParseError(s.to_string()))?;
            let octets: [u8; 6] = bytes
                .try_into()
                .map_err(|_| MacParseError(s.to_string()))?;
            return Ok(Self(octets));
        }

        s.parse::<MacAddr6>()
            .map(Self::from)
            .map_err(|_| MacParseError(s.to_string()))
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(":"))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// The input was not a recognizable MAC address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a MAC address: {0:?}")]
pub struct MacParseError(pub String);
