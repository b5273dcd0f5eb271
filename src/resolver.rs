//! # Override Resolver
//!
//! Pure decision logic shared by both pipelines. Nothing in here performs
//! I/O, so every rule can be exercised without a mesh.
//!
//! - [`resolve_for_get`] decides what to store after reading a live value:
//!   a group reference survives as long as the device still matches its
//!   template field for field, otherwise the live value is recorded inline.
//!   An inline value the device still reports is kept as stored.
//! - [`resolve_for_set`] decides what to transmit: inline values as-is,
//!   group references through the template registry, and an explicit
//!   [`Unresolvable`] when the named template does not exist.

use std::collections::BTreeMap;

use crate::document::Setting;

/// A group reference whose template is missing from `config_group`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("group '{group}' is not defined")]
pub struct Unresolvable {
    pub group: String,
}

/// Merge a freshly read `live` value into the stored setting.
pub fn resolve_for_get<T>(
    existing: Option<&Setting<T>>,
    live: T,
    templates: &BTreeMap<String, T>,
) -> Setting<T>
where
    T: PartialEq + Clone,
{
    match existing {
        Some(Setting::GroupRef(name)) if templates.get(name) == Some(&live) => {
            Setting::GroupRef(name.clone())
        }
        Some(Setting::Explicit(stored)) if *stored == live => Setting::Explicit(stored.clone()),
        _ => Setting::Explicit(live),
    }
}

/// Concrete value to push for a stored setting.
pub fn resolve_for_set<'a, T>(
    stored: &'a Setting<T>,
    templates: &'a BTreeMap<String, T>,
) -> Result<&'a T, Unresolvable> {
    match stored {
        Setting::Explicit(value) => Ok(value),
        Setting::GroupRef(name) => templates.get(name).ok_or_else(|| Unresolvable {
            group: name.clone(),
        }),
    }
}
