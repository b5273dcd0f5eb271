//! Setting payloads and the `GroupRef | Explicit` wrapper.
//!
//! In the document a setting is either a reference to a named template,
//! written `{group: default}`, or the full inline value. A map carrying both
//! `group` and inline fields is rejected when the document is loaded.

use serde::de::{self, DeserializeOwned, Error as _, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;
use std::fmt;

use crate::mesh::{KeyIndex, UnicastAddress};

/// A stored setting: either governed by a named template or spelled out.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting<T> {
    GroupRef(String),
    Explicit(T),
}

impl<T> Setting<T> {
    pub fn group(&self) -> Option<&str> {
        match self {
            Setting::GroupRef(name) => Some(name),
            Setting::Explicit(_) => None,
        }
    }

    pub fn explicit(&self) -> Option<&T> {
        match self {
            Setting::GroupRef(_) => None,
            Setting::Explicit(value) => Some(value),
        }
    }
}

#[derive(Serialize)]
struct GroupKey<'a> {
    group: &'a str,
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Setting::GroupRef(group) => GroupKey { group }.serialize(serializer),
            Setting::Explicit(value) => value.serialize(serializer),
        }
    }
}

fn setting_from_value<T: DeserializeOwned>(value: Value) -> Result<Setting<T>, String> {
    if let Value::Mapping(map) = &value {
        if let Some(group) = map.get("group") {
            if map.len() != 1 {
                return Err("a setting with `group` must not also carry inline fields".into());
            }
            return match group {
                Value::String(name) if !name.trim().is_empty() => {
                    Ok(Setting::GroupRef(name.clone()))
                }
                _ => Err("`group` must be a non-empty string".into()),
            };
        }
    }
    T::deserialize(value)
        .map(Setting::Explicit)
        .map_err(|e| e.to_string())
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Setting<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        setting_from_value(value).map_err(D::Error::custom)
    }
}

/// `serde(with)` helper: an absent setting is written as `{}` and both `{}`
/// and `null` read back as `None`.
pub(crate) mod optional_setting {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_yaml::Value;

    use super::{setting_from_value, Setting};

    pub fn serialize<T, S>(value: &Option<Setting<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(setting) => setting.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Setting<T>>, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Null => Ok(None),
            Value::Mapping(map) if map.is_empty() => Ok(None),
            _ => setting_from_value(value).map(Some).map_err(D::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Retransmissions {
    pub count: u8,
    /// Milliseconds between retransmissions.
    pub interval: u16,
}

/// Model publication parameters as written to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Publication {
    /// Publish destination (unicast or group address).
    pub unicast_addr: UnicastAddress,
    pub app_key: KeyIndex,
    pub ttl: u8,
    /// Publish period in milliseconds, 0 disables periodic publishing.
    pub period: u32,
    pub retransmissions: Retransmissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Unit,
    Percent,
}

impl TriggerType {
    /// Status Trigger Type bit as carried in a Sensor Cadence message.
    pub fn wire_value(self) -> u8 {
        match self {
            TriggerType::Unit => 0,
            TriggerType::Percent => 1,
        }
    }
}

/// A cadence delta or threshold.
///
/// Compares by value, so `5` and `5.0` are the same setting, but remembers
/// whether it was written as an integer and writes it back the same way.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    value: f64,
    integral: bool,
}

/// Largest magnitude at which every integer is exactly representable.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

impl Quantity {
    pub fn value(self) -> f64 {
        self.value
    }

    fn integer(value: i64) -> Self {
        Self {
            value: value as f64,
            integral: true,
        }
    }
}

impl From<f64> for Quantity {
    fn from(value: f64) -> Self {
        Self {
            value,
            integral: false,
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialEq<f64> for Quantity {
    fn eq(&self, other: &f64) -> bool {
        self.value == *other
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.integral && self.value.fract() == 0.0 && self.value.abs() < EXACT_INTEGER_LIMIT {
            serializer.serialize_i64(self.value as i64)
        } else {
            serializer.serialize_f64(self.value)
        }
    }
}

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
        Ok(Quantity::integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
        match i64::try_from(v) {
            Ok(v) => Ok(Quantity::integer(v)),
            Err(_) => Ok(Quantity::from(v as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
        Ok(Quantity::from(v))
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

/// Sensor cadence state for one property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cadence {
    pub fast_cadence_period_divisor: u8,
    pub status_trigger_type: TriggerType,
    pub status_trigger_delta_down: Quantity,
    pub status_trigger_delta_up: Quantity,
    /// Exponent n of the minimum interval 2^n ms.
    pub status_min_interval: u8,
    pub fast_cadence_low: Quantity,
    pub fast_cadence_high: Quantity,
}
