//! Get pipeline: read the mesh, merge into the document, persist once.

use log::{debug, info, warn};
use std::collections::BTreeMap;

use super::{RunOptions, RunReport, StopFlag};
use crate::directory::{DeviceDirectory, ElementDescriptor};
use crate::document::{ConfigDocument, Setting};
use crate::error::{MeshSensorError, Result};
use crate::logutil::escape_log;
use crate::mesh::{ModelId, UnicastAddress};
use crate::resolver::resolve_for_get;
use crate::store::DocumentStore;
use crate::transport::{CadenceStatus, PublicationGet, PublicationStatus, TransportClient};

/// Lock the document, refresh it from the mesh and write it back.
///
/// A missing document starts empty. When the run is interrupted nothing is
/// written and [`MeshSensorError::Interrupted`] is returned.
pub async fn run_get<D, T>(
    store: &DocumentStore,
    directory: &D,
    transport: &mut T,
    options: &RunOptions,
    stop: &StopFlag,
) -> Result<RunReport>
where
    D: DeviceDirectory + ?Sized,
    T: TransportClient,
{
    let _lock = store.lock()?;
    let mut doc = store.load_or_default().await?;
    let report = refresh_document(&mut doc, directory, transport, options, stop).await?;
    store.persist(&doc)?;
    info!("Get finished: {}", report);
    Ok(report)
}

/// Merge live state of every selected Sensor Setup Server element into `doc`.
pub async fn refresh_document<D, T>(
    doc: &mut ConfigDocument,
    directory: &D,
    transport: &mut T,
    options: &RunOptions,
    stop: &StopFlag,
) -> Result<RunReport>
where
    D: DeviceDirectory + ?Sized,
    T: TransportClient,
{
    let mut report = RunReport::default();
    let mut descriptors = directory.elements(ModelId::SENSOR_SETUP_SERVER);
    descriptors.sort_by_key(|d| d.address);
    if descriptors.is_empty() {
        warn!(
            "No {} elements in the provisioning database",
            ModelId::SENSOR_SETUP_SERVER
        );
    }

    for descriptor in descriptors.iter().filter(|d| options.selects(d.address)) {
        if stop.is_stopped() {
            warn!("Get interrupted before {}, document not written", descriptor.address);
            return Err(MeshSensorError::Interrupted);
        }
        report.elements += 1;
        if doc.seed(descriptor) {
            info!("{}: new element", descriptor.address);
            report.seeded += 1;
        }
        refresh_publication(doc, descriptor, transport, options, &mut report).await;
        refresh_cadence(doc, descriptor, transport, options, &mut report).await;
    }

    if let (Some(target), 0) = (options.filter, report.elements) {
        warn!(
            "{} is not a {} element in the provisioning database",
            target,
            ModelId::SENSOR_SETUP_SERVER
        );
    }
    Ok(report)
}

async fn refresh_publication<T: TransportClient>(
    doc: &mut ConfigDocument,
    descriptor: &ElementDescriptor,
    transport: &mut T,
    options: &RunOptions,
    report: &mut RunReport,
) {
    let address = descriptor.address;
    info!("{}: load publication...", address);
    let request = PublicationGet {
        destination: descriptor.device_address,
        net_key: descriptor.net_key,
        element_address: address,
        model: ModelId::SENSOR_SERVER,
    };
    let live = match transport
        .get_publication(&request, options.params)
        .await
        .and_then(PublicationStatus::into_result)
    {
        Ok(status) => status.publication,
        Err(e) => {
            warn!("{}: publication get failed: {}", address, e);
            report.failed += 1;
            return;
        }
    };
    report.succeeded += 1;

    let ConfigDocument {
        config_group,
        elements,
    } = doc;
    if let Some(entry) = elements.get_mut(&address) {
        let merged = merge_live(
            address,
            "publication",
            entry.publication.as_ref(),
            live,
            &config_group.publication,
        );
        entry.publication = Some(merged);
    }
}

async fn refresh_cadence<T: TransportClient>(
    doc: &mut ConfigDocument,
    descriptor: &ElementDescriptor,
    transport: &mut T,
    options: &RunOptions,
    report: &mut RunReport,
) {
    let address = descriptor.address;
    info!("{}: load cadence...", address);
    let sensors = match transport
        .descriptor_get(address, descriptor.app_key, options.params)
        .await
    {
        Ok(sensors) => sensors,
        Err(e) => {
            warn!("{}: sensor descriptor get failed, cadence left as stored: {}", address, e);
            report.failed += 1;
            return;
        }
    };
    report.succeeded += 1;

    let ConfigDocument {
        config_group,
        elements,
    } = doc;
    for sensor in sensors {
        let Some(name) = options.properties.name_of(sensor.property_id) else {
            warn!(
                "{}: unknown sensor property 0x{:04x}, skipping",
                address, sensor.property_id
            );
            report.skipped += 1;
            continue;
        };
        match transport
            .cadence_get(address, descriptor.app_key, sensor.property_id, options.params)
            .await
        {
            Ok(CadenceStatus {
                cadence: Some(live),
                ..
            }) => {
                report.succeeded += 1;
                if let Some(entry) = elements.get_mut(&address) {
                    // keep whatever spelling the document already uses for this property
                    let key = entry
                        .cadence
                        .keys()
                        .find(|key| options.properties.id_of(key) == Some(sensor.property_id))
                        .cloned()
                        .unwrap_or_else(|| name.to_string());
                    let merged = merge_live(
                        address,
                        &format!("cadence '{}'", escape_log(&key)),
                        entry.cadence.get(&key),
                        live,
                        &config_group.cadence,
                    );
                    entry.cadence.insert(key, merged);
                }
            }
            Ok(CadenceStatus { cadence: None, .. }) => {
                report.succeeded += 1;
                debug!("{}: {} does not support cadence", address, name);
            }
            Err(e) => {
                warn!("{}: cadence get for {} failed: {}", address, name, e);
                report.failed += 1;
            }
        }
    }
}

fn merge_live<T: PartialEq + Clone>(
    address: UnicastAddress,
    what: &str,
    existing: Option<&Setting<T>>,
    live: T,
    templates: &BTreeMap<String, T>,
) -> Setting<T> {
    let merged = resolve_for_get(existing, live, templates);
    match (existing, &merged) {
        (Some(Setting::GroupRef(group)), Setting::Explicit(_)) if templates.contains_key(group) => {
            info!(
                "{}: {} no longer matches group '{}', storing device values inline",
                address,
                what,
                escape_log(group)
            );
        }
        (Some(Setting::GroupRef(group)), Setting::Explicit(_)) => {
            warn!(
                "{}: {} refers to undefined group '{}', storing device values inline",
                address,
                what,
                escape_log(group)
            );
        }
        (Some(Setting::GroupRef(group)), Setting::GroupRef(_)) => {
            debug!("{}: {} still matches group '{}'", address, what, escape_log(group));
        }
        _ => {}
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Cadence, Publication, Quantity, Retransmissions, TriggerType};
    use crate::transport::sim::{Operation, SimElement, SimState, SimulatedMesh};
    use tokio::time::Duration;

    fn options() -> RunOptions {
        RunOptions {
            params: crate::transport::CallParams {
                send_interval: Duration::ZERO,
                timeout: Duration::from_millis(200),
            },
            ..RunOptions::default()
        }
    }

    fn publication(ttl: u8) -> Publication {
        Publication {
            unicast_addr: UnicastAddress(0xc000),
            app_key: 0,
            ttl,
            period: 10_000,
            retransmissions: Retransmissions {
                count: 1,
                interval: 50,
            },
        }
    }

    fn cadence(delta: f64) -> Cadence {
        Cadence {
            fast_cadence_period_divisor: 2,
            status_trigger_type: TriggerType::Unit,
            status_trigger_delta_down: delta.into(),
            status_trigger_delta_up: delta.into(),
            status_min_interval: 10,
            fast_cadence_low: Quantity::from(0.0),
            fast_cadence_high: Quantity::from(100.0),
        }
    }

    fn mesh() -> SimulatedMesh {
        let mut state = SimState::default();
        state.elements.insert(
            UnicastAddress(0x1001),
            SimElement {
                device_address: UnicastAddress(0x1000),
                net_key: 0,
                app_key: 0,
                publication: Some(publication(5)),
                sensors: [(0x004f, Some(cadence(5.0))), (0x0042, None), (0x7777, None)]
                    .into_iter()
                    .collect(),
            },
        );
        SimulatedMesh::new(state)
    }

    #[tokio::test]
    async fn seeds_and_records_live_values() {
        let mut mesh = mesh();
        let directory = mesh.directory();
        let mut doc = ConfigDocument::default();
        let report = refresh_document(&mut doc, &directory, &mut mesh, &options(), &StopFlag::new())
            .await
            .unwrap();

        assert_eq!(report.seeded, 1);
        assert_eq!(report.skipped, 1, "0x7777 is not a known property");
        let entry = doc.element(UnicastAddress(0x1001)).unwrap();
        assert_eq!(entry.publication, Some(Setting::Explicit(publication(5))));
        assert_eq!(
            entry.cadence.get("temperature"),
            Some(&Setting::Explicit(cadence(5.0)))
        );
        assert!(!entry.cadence.contains_key("motion_sensed"));
    }

    #[tokio::test]
    async fn group_reference_survives_matching_device() {
        let mut mesh = mesh();
        let directory = mesh.directory();
        let mut doc = ConfigDocument::default();
        doc.config_group
            .publication
            .insert("default".into(), publication(5));
        doc.config_group.cadence.insert("default".into(), cadence(5.0));
        doc.seed(&directory.0[0]);
        {
            let entry = doc.element_mut(UnicastAddress(0x1001)).unwrap();
            entry.publication = Some(Setting::GroupRef("default".into()));
            entry
                .cadence
                .insert("temperature".into(), Setting::GroupRef("default".into()));
        }

        refresh_document(&mut doc, &directory, &mut mesh, &options(), &StopFlag::new())
            .await
            .unwrap();
        let entry = doc.element(UnicastAddress(0x1001)).unwrap();
        assert_eq!(entry.publication, Some(Setting::GroupRef("default".into())));
        assert_eq!(
            entry.cadence.get("temperature"),
            Some(&Setting::GroupRef("default".into()))
        );
    }

    #[tokio::test]
    async fn failed_cadence_call_keeps_stored_entry() {
        let mut mesh = mesh();
        mesh.fail(UnicastAddress(0x1001), Operation::CadenceGet, Some(0x004f));
        let directory = mesh.directory();
        let mut doc = ConfigDocument::default();
        doc.seed(&directory.0[0]);
        doc.element_mut(UnicastAddress(0x1001))
            .unwrap()
            .cadence
            .insert("temperature".into(), Setting::Explicit(cadence(1.0)));

        let report = refresh_document(&mut doc, &directory, &mut mesh, &options(), &StopFlag::new())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(
            doc.element(UnicastAddress(0x1001)).unwrap().cadence["temperature"],
            Setting::Explicit(cadence(1.0))
        );
    }

    #[tokio::test]
    async fn cadence_entry_is_matched_by_property_not_spelling() {
        let mut mesh = mesh();
        let directory = mesh.directory();
        let mut doc = ConfigDocument::default();
        doc.config_group.cadence.insert("default".into(), cadence(1.0));
        doc.seed(&directory.0[0]);
        doc.element_mut(UnicastAddress(0x1001))
            .unwrap()
            .cadence
            .insert("Temperature".into(), Setting::GroupRef("default".into()));

        refresh_document(&mut doc, &directory, &mut mesh, &options(), &StopFlag::new())
            .await
            .unwrap();
        let entry = doc.element(UnicastAddress(0x1001)).unwrap();
        let keys: Vec<_> = entry.cadence.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Temperature"]);
        assert_eq!(entry.cadence["Temperature"], Setting::Explicit(cadence(5.0)));
    }

    #[tokio::test]
    async fn stop_flag_aborts_before_next_element() {
        let mut mesh = mesh();
        let directory = mesh.directory();
        let stop = StopFlag::new();
        stop.stop();
        let mut doc = ConfigDocument::default();
        let result = refresh_document(&mut doc, &directory, &mut mesh, &options(), &stop).await;
        assert!(matches!(result, Err(MeshSensorError::Interrupted)));
        assert!(mesh.calls().is_empty());
    }
}
