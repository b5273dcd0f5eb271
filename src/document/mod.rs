//! # Sensor Configuration Document
//!
//! The declarative, user-editable description of how every sensor element
//! should report. It has two top-level keys:
//!
//! - `config_group` - named publication and cadence templates ([`GroupTemplates`])
//! - `elements` - one [`ElementConfig`] per element, keyed by its hex address
//!
//! ```yaml
//! config_group:
//!   publication:
//!     default: {unicast_addr: "0xc000", app_key: 0, ttl: 5, period: 10000,
//!               retransmissions: {count: 1, interval: 50}}
//! elements:
//!   "0x1001":
//!     model: SensorSetupServer
//!     app_key: 0
//!     device_unicast_addr: "0x1000"
//!     net_key: 0
//!     publication: {group: default}
//!     cadence: {}
//! ```
//!
//! Loading and persisting lives in [`crate::store`]; this module only holds
//! the data model and its consistency checks ([`validate`]).

pub mod setting;
pub mod validate;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::directory::ElementDescriptor;
use crate::mesh::{KeyIndex, UnicastAddress};

pub use setting::{Cadence, Publication, Quantity, Retransmissions, Setting, TriggerType};
pub use validate::{validate, Issue};

pub type PublicationSetting = Setting<Publication>;
pub type CadenceSetting = BTreeMap<String, Setting<Cadence>>;

/// User authored templates. The engine only ever reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTemplates {
    #[serde(default)]
    pub publication: BTreeMap<String, Publication>,
    #[serde(default)]
    pub cadence: BTreeMap<String, Cadence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementConfig {
    pub model: String,
    pub app_key: KeyIndex,
    #[serde(alias = "device_unicat_addr")]
    pub device_unicast_addr: UnicastAddress,
    pub net_key: KeyIndex,
    #[serde(default, with = "setting::optional_setting")]
    pub publication: Option<PublicationSetting>,
    #[serde(default)]
    pub cadence: CadenceSetting,
}

impl ElementConfig {
    /// Fresh entry carrying only what the provisioning database knows.
    pub fn seeded(descriptor: &ElementDescriptor) -> Self {
        Self {
            model: descriptor.model.name(),
            app_key: descriptor.app_key,
            device_unicast_addr: descriptor.device_address,
            net_key: descriptor.net_key,
            publication: None,
            cadence: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub config_group: GroupTemplates,
    #[serde(default)]
    pub elements: BTreeMap<UnicastAddress, ElementConfig>,
}

impl ConfigDocument {
    /// Insert a seeded entry for `descriptor` unless one already exists.
    /// Returns `true` when a new entry was created.
    pub fn seed(&mut self, descriptor: &ElementDescriptor) -> bool {
        if self.elements.contains_key(&descriptor.address) {
            return false;
        }
        self.elements
            .insert(descriptor.address, ElementConfig::seeded(descriptor));
        true
    }

    pub fn element(&self, address: UnicastAddress) -> Option<&ElementConfig> {
        self.elements.get(&address)
    }

    pub fn element_mut(&mut self, address: UnicastAddress) -> Option<&mut ElementConfig> {
        self.elements.get_mut(&address)
    }

    /// Elements in address order, optionally restricted to one address.
    pub fn iter_filtered(
        &self,
        filter: Option<UnicastAddress>,
    ) -> impl Iterator<Item = (&UnicastAddress, &ElementConfig)> {
        self.elements
            .iter()
            .filter(move |(address, _)| filter.map_or(true, |target| **address == target))
    }
}
