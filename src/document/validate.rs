//! Offline consistency checks for a [`ConfigDocument`].
//!
//! Nothing here touches the network. The checks mirror what a device would
//! reject or what the Set pipeline would have to skip: dangling group
//! references, property names missing from the property table and field
//! values outside their on-air ranges.

use std::collections::BTreeMap;
use std::fmt;

use super::{Cadence, ConfigDocument, Publication, Setting};
use crate::mesh::PropertyTable;

/// One finding, located by a dotted document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub location: String,
    pub message: String,
}

impl Issue {
    fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

const TTL_USE_DEFAULT: u8 = 0xFF;
const TTL_MAX: u8 = 0x7F;
const RETRANSMIT_COUNT_MAX: u8 = 7;
const RETRANSMIT_STEP_MS: u16 = 50;
const RETRANSMIT_INTERVAL_MAX_MS: u16 = 32 * RETRANSMIT_STEP_MS;
const PERIOD_STEPS_MAX: u32 = 0x3F;
const PERIOD_RESOLUTIONS_MS: [u32; 4] = [100, 1_000, 10_000, 600_000];
const FAST_CADENCE_DIVISOR_MAX: u8 = 15;
const MIN_INTERVAL_EXPONENT_MAX: u8 = 26;

/// Whether `period_ms` can be expressed as 6-bit steps of one of the four
/// publish period resolutions.
pub fn period_is_encodable(period_ms: u32) -> bool {
    period_ms == 0
        || PERIOD_RESOLUTIONS_MS.iter().any(|res| {
            period_ms % res == 0 && (1..=PERIOD_STEPS_MAX).contains(&(period_ms / res))
        })
}

pub fn check_publication(location: &str, publication: &Publication, issues: &mut Vec<Issue>) {
    if publication.ttl > TTL_MAX && publication.ttl != TTL_USE_DEFAULT {
        issues.push(Issue::new(
            format!("{location}.ttl"),
            format!("ttl {} is outside 0..=127 (or 255 for default)", publication.ttl),
        ));
    }
    if !period_is_encodable(publication.period) {
        issues.push(Issue::new(
            format!("{location}.period"),
            format!("period {}ms cannot be encoded as a publish period", publication.period),
        ));
    }
    let retransmit = publication.retransmissions;
    if retransmit.count > RETRANSMIT_COUNT_MAX {
        issues.push(Issue::new(
            format!("{location}.retransmissions.count"),
            format!("count {} exceeds {RETRANSMIT_COUNT_MAX}", retransmit.count),
        ));
    }
    if retransmit.interval < RETRANSMIT_STEP_MS
        || retransmit.interval > RETRANSMIT_INTERVAL_MAX_MS
        || retransmit.interval % RETRANSMIT_STEP_MS != 0
    {
        issues.push(Issue::new(
            format!("{location}.retransmissions.interval"),
            format!(
                "interval {}ms must be a multiple of {RETRANSMIT_STEP_MS} in {RETRANSMIT_STEP_MS}..={RETRANSMIT_INTERVAL_MAX_MS}",
                retransmit.interval
            ),
        ));
    }
}

pub fn check_cadence(location: &str, cadence: &Cadence, issues: &mut Vec<Issue>) {
    if cadence.fast_cadence_period_divisor > FAST_CADENCE_DIVISOR_MAX {
        issues.push(Issue::new(
            format!("{location}.fast_cadence_period_divisor"),
            format!(
                "divisor {} exceeds {FAST_CADENCE_DIVISOR_MAX}",
                cadence.fast_cadence_period_divisor
            ),
        ));
    }
    if cadence.status_min_interval > MIN_INTERVAL_EXPONENT_MAX {
        issues.push(Issue::new(
            format!("{location}.status_min_interval"),
            format!(
                "exponent {} exceeds {MIN_INTERVAL_EXPONENT_MAX}",
                cadence.status_min_interval
            ),
        ));
    }
    for (field, value) in [
        ("status_trigger_delta_down", cadence.status_trigger_delta_down.value()),
        ("status_trigger_delta_up", cadence.status_trigger_delta_up.value()),
    ] {
        if !value.is_finite() || value < 0.0 {
            issues.push(Issue::new(
                format!("{location}.{field}"),
                format!("delta {value} must be a finite, non-negative number"),
            ));
        }
    }
    for (field, value) in [
        ("fast_cadence_low", cadence.fast_cadence_low.value()),
        ("fast_cadence_high", cadence.fast_cadence_high.value()),
    ] {
        if !value.is_finite() {
            issues.push(Issue::new(
                format!("{location}.{field}"),
                format!("{value} is not a finite number"),
            ));
        }
    }
}

/// Run every check and return the findings in document order.
pub fn validate(doc: &ConfigDocument, properties: &PropertyTable) -> Vec<Issue> {
    let mut issues = Vec::new();
    let templates = &doc.config_group;

    for (name, publication) in &templates.publication {
        check_publication(&format!("config_group.publication.{name}"), publication, &mut issues);
    }
    for (name, cadence) in &templates.cadence {
        check_cadence(&format!("config_group.cadence.{name}"), cadence, &mut issues);
    }

    for (address, element) in &doc.elements {
        let base = format!("elements.{address}");
        match &element.publication {
            Some(Setting::GroupRef(group)) if !templates.publication.contains_key(group) => {
                issues.push(Issue::new(
                    format!("{base}.publication"),
                    format!("group '{group}' is not defined in config_group.publication"),
                ));
            }
            Some(Setting::Explicit(publication)) => {
                check_publication(&format!("{base}.publication"), publication, &mut issues);
            }
            _ => {}
        }
        let mut seen: BTreeMap<u16, &str> = BTreeMap::new();
        for (property, setting) in &element.cadence {
            let location = format!("{base}.cadence.{property}");
            match properties.id_of(property) {
                None => issues.push(Issue::new(
                    location.clone(),
                    format!("'{property}' is not a known sensor property"),
                )),
                Some(id) => {
                    if let Some(first) = seen.insert(id, property) {
                        issues.push(Issue::new(
                            location.clone(),
                            format!("'{property}' and '{first}' name the same property 0x{id:04x}"),
                        ));
                    }
                }
            }
            match setting {
                Setting::GroupRef(group) if !templates.cadence.contains_key(group) => {
                    issues.push(Issue::new(
                        location,
                        format!("group '{group}' is not defined in config_group.cadence"),
                    ));
                }
                Setting::Explicit(cadence) => check_cadence(&location, cadence, &mut issues),
                Setting::GroupRef(_) => {}
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ElementConfig, Quantity, Retransmissions, TriggerType};
    use crate::mesh::UnicastAddress;

    fn publication() -> Publication {
        Publication {
            unicast_addr: UnicastAddress(0xc000),
            app_key: 0,
            ttl: 5,
            period: 10_000,
            retransmissions: Retransmissions {
                count: 1,
                interval: 50,
            },
        }
    }

    fn cadence() -> Cadence {
        Cadence {
            fast_cadence_period_divisor: 2,
            status_trigger_type: TriggerType::Unit,
            status_trigger_delta_down: Quantity::from(5.0),
            status_trigger_delta_up: Quantity::from(5.0),
            status_min_interval: 10,
            fast_cadence_low: Quantity::from(0.0),
            fast_cadence_high: Quantity::from(100.0),
        }
    }

    fn element() -> ElementConfig {
        ElementConfig {
            model: "SensorSetupServer".into(),
            app_key: 0,
            device_unicast_addr: UnicastAddress(0x1000),
            net_key: 0,
            publication: None,
            cadence: BTreeMap::new(),
        }
    }

    #[test]
    fn period_encoding() {
        assert!(period_is_encodable(0));
        assert!(period_is_encodable(100));
        assert!(period_is_encodable(6_300));
        assert!(period_is_encodable(10_000));
        assert!(period_is_encodable(600_000 * 63));
        assert!(!period_is_encodable(150));
        assert!(!period_is_encodable(600_000 * 64));
    }

    #[test]
    fn clean_document_has_no_issues() {
        let mut doc = ConfigDocument::default();
        doc.config_group.publication.insert("default".into(), publication());
        doc.config_group.cadence.insert("default".into(), cadence());
        let mut entry = element();
        entry.publication = Some(Setting::GroupRef("default".into()));
        entry
            .cadence
            .insert("temperature".into(), Setting::GroupRef("default".into()));
        entry
            .cadence
            .insert("humidity".into(), Setting::Explicit(cadence()));
        doc.elements.insert(UnicastAddress(0x1001), entry);
        assert!(validate(&doc, &PropertyTable::builtin()).is_empty());
    }

    #[test]
    fn reports_dangling_groups_and_unknown_properties() {
        let mut doc = ConfigDocument::default();
        let mut entry = element();
        entry.publication = Some(Setting::GroupRef("missing".into()));
        entry
            .cadence
            .insert("unobtainium".into(), Setting::GroupRef("nope".into()));
        doc.elements.insert(UnicastAddress(0x1001), entry);
        let issues = validate(&doc, &PropertyTable::builtin());
        let locations: Vec<_> = issues.iter().map(|i| i.location.as_str()).collect();
        assert_eq!(
            locations,
            vec![
                "elements.0x1001.publication",
                "elements.0x1001.cadence.unobtainium",
                "elements.0x1001.cadence.unobtainium",
            ]
        );
    }

    #[test]
    fn reports_out_of_range_fields() {
        let mut doc = ConfigDocument::default();
        let mut bad = publication();
        bad.ttl = 200;
        bad.retransmissions = Retransmissions {
            count: 9,
            interval: 75,
        };
        doc.config_group.publication.insert("bad".into(), bad);
        let mut bad_cadence = cadence();
        bad_cadence.fast_cadence_period_divisor = 16;
        bad_cadence.status_trigger_delta_up = Quantity::from(-1.0);
        doc.config_group.cadence.insert("bad".into(), bad_cadence);
        let issues = validate(&doc, &PropertyTable::builtin());
        assert_eq!(issues.len(), 5, "{issues:?}");
        assert!(issues[0].to_string().starts_with("config_group.publication.bad.ttl:"));
    }

    #[test]
    fn reports_two_spellings_of_one_property() {
        let mut doc = ConfigDocument::default();
        let mut entry = element();
        entry
            .cadence
            .insert("Temperature".into(), Setting::Explicit(cadence()));
        entry
            .cadence
            .insert("temperature".into(), Setting::Explicit(cadence()));
        doc.elements.insert(UnicastAddress(0x1001), entry);
        let issues = validate(&doc, &PropertyTable::builtin());
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].location, "elements.0x1001.cadence.temperature");
    }
}
