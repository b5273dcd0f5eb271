//! # Mesh Primitives
//!
//! Small value types shared by every other module: unicast addresses with
//! their canonical hex text form, SIG model identifiers for the sensor role,
//! and the sensor property table (see [`properties`]).
//!
//! Addresses are written as lowercase, zero-padded, `0x`-prefixed hex
//! (`0x1001`). Parsing is more lenient so that values copied from the
//! provisioning database (`"1001"`) or typed on the command line (`0X1001`)
//! are accepted.

pub mod properties;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub use properties::PropertyTable;

/// Mesh key index (network or application key). Only the index is ever
/// handled here, never key material.
pub type KeyIndex = u16;

/// 16-bit mesh element address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnicastAddress(pub u16);

impl UnicastAddress {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Address of the `index`-th element of a node whose primary element
    /// sits at `self`. Returns `None` on overflow.
    pub fn offset(self, index: u16) -> Option<Self> {
        self.0.checked_add(index).map(Self)
    }
}

impl fmt::Display for UnicastAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl From<u16> for UnicastAddress {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<UnicastAddress> for u16 {
    fn from(addr: UnicastAddress) -> Self {
        addr.0
    }
}

/// Error returned for text that is not a 16-bit hex address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a 16-bit hex address")]
pub struct AddressParseError(pub String);

/// Parse a 16-bit hex value with an optional `0x`/`0X` prefix.
pub fn parse_hex_u16(input: &str) -> Option<u16> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

impl FromStr for UnicastAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_u16(s)
            .map(Self)
            .ok_or_else(|| AddressParseError(s.to_string()))
    }
}

impl Serialize for UnicastAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct AddressVisitor;

impl<'de> Visitor<'de> for AddressVisitor {
    type Value = UnicastAddress;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a hex address string such as \"0x1001\" or an integer in 0..=0xffff")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        u16::try_from(v)
            .map(UnicastAddress)
            .map_err(|_| E::custom(format!("address {v} does not fit in 16 bits")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u16::try_from(v)
            .map(UnicastAddress)
            .map_err(|_| E::custom(format!("address {v} does not fit in 16 bits")))
    }
}

impl<'de> Deserialize<'de> for UnicastAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AddressVisitor)
    }
}

/// SIG model identifier. Only the sensor family is named; anything else is
/// carried through as its raw number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(pub u32);

impl ModelId {
    pub const SENSOR_SERVER: ModelId = ModelId(0x1100);
    pub const SENSOR_SETUP_SERVER: ModelId = ModelId(0x1101);
    pub const SENSOR_CLIENT: ModelId = ModelId(0x1102);

    pub fn name(self) -> String {
        match self {
            Self::SENSOR_SERVER => "SensorServer".to_string(),
            Self::SENSOR_SETUP_SERVER => "SensorSetupServer".to_string(),
            Self::SENSOR_CLIENT => "SensorClient".to_string(),
            ModelId(raw) if raw > 0xffff => format!("0x{raw:08x}"),
            ModelId(raw) => format!("0x{raw:04x}"),
        }
    }

    /// Parse a provisioning-database model id: 4 hex digits for SIG models,
    /// 8 for vendor models (company id + model id).
    pub fn from_hex(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > 8 {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(ModelId)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
