//! Set pipeline: resolve every stored setting and push it to the devices.
//! The document is never modified.

use log::{info, warn};
use std::collections::BTreeSet;

use super::{RunOptions, RunReport, StopFlag};
use crate::document::{ConfigDocument, ElementConfig, GroupTemplates};
use crate::error::{MeshSensorError, Result};
use crate::logutil::escape_log;
use crate::mesh::{ModelId, UnicastAddress};
use crate::resolver::{resolve_for_set, Unresolvable};
use crate::store::DocumentStore;
use crate::transport::{CadenceSet, PublicationSet, PublicationStatus, TransportClient};

/// Load the document and push it. A missing document is an error here.
pub async fn run_set<T: TransportClient>(
    store: &DocumentStore,
    transport: &mut T,
    options: &RunOptions,
    stop: &StopFlag,
) -> Result<RunReport> {
    let doc = store.load().await?;
    let report = push_document(&doc, transport, options, stop).await?;
    info!("Set finished: {}", report);
    Ok(report)
}

pub async fn push_document<T: TransportClient>(
    doc: &ConfigDocument,
    transport: &mut T,
    options: &RunOptions,
    stop: &StopFlag,
) -> Result<RunReport> {
    let mut report = RunReport::default();
    for (address, element) in doc.iter_filtered(options.filter) {
        if stop.is_stopped() {
            warn!("Set interrupted before {}", address);
            return Err(MeshSensorError::Interrupted);
        }
        report.elements += 1;
        push_publication(*address, element, &doc.config_group, transport, options, &mut report)
            .await;
        push_cadence(*address, element, &doc.config_group, transport, options, &mut report).await;
    }
    if let (Some(target), 0) = (options.filter, report.elements) {
        warn!("{} is not in the document, nothing to push", target);
    }
    Ok(report)
}

fn unresolvable(address: UnicastAddress, kind: &'static str, err: Unresolvable) -> MeshSensorError {
    MeshSensorError::UnresolvableGroupReference {
        element: address,
        kind,
        group: escape_log(&err.group),
    }
}

async fn push_publication<T: TransportClient>(
    address: UnicastAddress,
    element: &ElementConfig,
    groups: &GroupTemplates,
    transport: &mut T,
    options: &RunOptions,
    report: &mut RunReport,
) {
    let Some(setting) = &element.publication else {
        info!("{}: no publication configured, skipping", address);
        return;
    };
    let publication = match resolve_for_set(setting, &groups.publication) {
        Ok(publication) => *publication,
        Err(err) => {
            warn!("{}, publication not pushed", unresolvable(address, "publication", err));
            report.skipped += 1;
            return;
        }
    };
    let request = PublicationSet {
        destination: element.device_unicast_addr,
        net_key: element.net_key,
        element_address: address,
        model: ModelId::SENSOR_SERVER,
        publication,
    };
    if options.dry_run {
        info!("{}: would set publication {:?}", address, publication);
        report.succeeded += 1;
        return;
    }
    info!("{}: store publication...", address);
    match transport
        .set_publication(&request, options.params)
        .await
        .and_then(PublicationStatus::into_result)
    {
        Ok(_) => report.succeeded += 1,
        Err(e) => {
            warn!("{}: publication set failed: {}", address, e);
            report.failed += 1;
        }
    }
}

async fn push_cadence<T: TransportClient>(
    address: UnicastAddress,
    element: &ElementConfig,
    groups: &GroupTemplates,
    transport: &mut T,
    options: &RunOptions,
    report: &mut RunReport,
) {
    let mut pushed = BTreeSet::new();
    for (name, setting) in &element.cadence {
        let Some(property_id) = options.properties.id_of(name) else {
            warn!(
                "{}: {}, cadence not pushed",
                address,
                MeshSensorError::UnknownProperty(escape_log(name))
            );
            report.skipped += 1;
            continue;
        };
        if !pushed.insert(property_id) {
            warn!(
                "{}: '{}' names property 0x{:04x} a second time, cadence not pushed",
                address,
                escape_log(name),
                property_id
            );
            report.skipped += 1;
            continue;
        }
        let cadence = match resolve_for_set(setting, &groups.cadence) {
            Ok(cadence) => *cadence,
            Err(err) => {
                warn!(
                    "{}, cadence for {} not pushed",
                    unresolvable(address, "cadence", err),
                    escape_log(name)
                );
                report.skipped += 1;
                continue;
            }
        };
        let request = CadenceSet {
            destination: address,
            app_key: element.app_key,
            property_id,
            cadence,
        };
        if options.dry_run {
            info!("{}: would set cadence for {} {:?}", address, name, cadence);
            report.succeeded += 1;
            continue;
        }
        info!("{}: store cadence for {}...", address, name);
        match transport.cadence_set(&request, options.params).await {
            Ok(status) if status.cadence.is_some() => report.succeeded += 1,
            Ok(_) => {
                warn!("{}: device reports no cadence support for {}", address, name);
                report.failed += 1;
            }
            Err(e) => {
                warn!("{}: cadence set for {} failed: {}", address, name, e);
                report.failed += 1;
            }
        }
    }
}
