//! Sensor property identifiers and their canonical names.
//!
//! The document stores cadence entries under a human readable name
//! (`temperature`), the devices speak 16-bit property IDs. The table maps
//! both ways. Names are canonicalised to lowercase snake case so that
//! `Present-Ambient Temperature` style spellings from hand edits resolve.

use std::collections::{BTreeMap, HashMap};

/// Built-in mesh device property IDs used by common sensor firmware.
const BUILTIN: &[(&str, u16)] = &[
    ("motion_sensed", 0x0042),
    ("motion_threshold", 0x0043),
    ("people_count", 0x004C),
    ("presence_detected", 0x004D),
    ("light_level", 0x004E),
    ("temperature", 0x004F),
    ("indoor_temperature", 0x0056),
    ("outdoor_temperature", 0x005B),
    ("precise_temperature", 0x0075),
    ("humidity", 0x0076),
    ("co2", 0x0077),
    ("voc", 0x0078),
    ("noise", 0x0079),
];

/// Lowercase, trim and fold separators to `_`.
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = true;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[derive(Debug, Clone)]
pub struct PropertyTable {
    by_id: BTreeMap<u16, String>,
    by_name: BTreeMap<String, u16>,
}

impl PropertyTable {
    pub fn builtin() -> Self {
        let mut table = Self {
            by_id: BTreeMap::new(),
            by_name: BTreeMap::new(),
        };
        for (name, id) in BUILTIN {
            table.insert(name, *id);
        }
        table
    }

    /// Built-in table extended (or overridden) by user supplied entries.
    /// An override that reuses an ID replaces the built-in name for it.
    pub fn with_overrides(overrides: &HashMap<String, u16>) -> Self {
        let mut table = Self::builtin();
        let mut sorted: Vec<_> = overrides.iter().collect();
        sorted.sort();
        for (name, id) in sorted {
            table.insert(name, *id);
        }
        table
    }

    fn insert(&mut self, name: &str, id: u16) {
        let name = canonical_name(name);
        if let Some(previous) = self.by_id.insert(id, name.clone()) {
            self.by_name.remove(&previous);
        }
        if let Some(previous_id) = self.by_name.insert(name, id) {
            if previous_id != id {
                self.by_id.remove(&previous_id);
            }
        }
    }

    pub fn name_of(&self, id: u16) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<u16> {
        self.by_name.get(&canonical_name(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for PropertyTable {
    fn default() -> Self {
        Self::builtin()
    }
}
