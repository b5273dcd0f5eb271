//! Test utilities & fixtures.
//! Builds a small simulated mesh and matching documents; tests that write to
//! disk get their own temp dir.
#![allow(dead_code)]

use meshsensor::document::{Cadence, Publication, Quantity, Retransmissions, TriggerType};
use meshsensor::mesh::UnicastAddress;
use meshsensor::pipeline::RunOptions;
use meshsensor::store::DocumentStore;
use meshsensor::transport::sim::{SimElement, SimState, SimulatedMesh};
use meshsensor::transport::CallParams;
use std::collections::BTreeMap;
use std::time::Duration;

pub const TEMPERATURE: u16 = 0x004f;
pub const HUMIDITY: u16 = 0x0076;

pub fn addr(raw: u16) -> UnicastAddress {
    UnicastAddress(raw)
}

/// No pacing, short deadline.
pub fn fast_options() -> RunOptions {
    RunOptions {
        params: CallParams {
            send_interval: Duration::ZERO,
            timeout: Duration::from_millis(250),
        },
        ..RunOptions::default()
    }
}

pub fn publication(ttl: u8, period: u32) -> Publication {
    Publication {
        unicast_addr: addr(0xc000),
        app_key: 0,
        ttl,
        period,
        retransmissions: Retransmissions {
            count: 1,
            interval: 50,
        },
    }
}

pub fn cadence(delta: f64) -> Cadence {
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

fn element(device: u16, sensors: &[(u16, Option<Cadence>)]) -> SimElement {
    SimElement {
        device_address: addr(device),
        net_key: 0,
        app_key: 0,
        publication: Some(publication(5, 10_000)),
        sensors: sensors.iter().copied().collect::<BTreeMap<_, _>>(),
    }
}

/// Three elements on two nodes, every one reporting temperature and
/// humidity with the same cadence.
pub fn three_element_mesh() -> SimulatedMesh {
    let sensors = [(TEMPERATURE, Some(cadence(5.0))), (HUMIDITY, Some(cadence(5.0)))];
    let mut state = SimState::default();
    state.elements.insert(addr(0x1001), element(0x1000, &sensors));
    state.elements.insert(addr(0x1002), element(0x1000, &sensors));
    state.elements.insert(addr(0x2001), element(0x2000, &sensors));
    SimulatedMesh::new(state)
}

pub fn temp_store() -> (tempfile::TempDir, DocumentStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mesh_sensor_config.yaml");
    let store = DocumentStore::new(path.to_string_lossy().into_owned());
    (dir, store)
}

pub fn read(store: &DocumentStore) -> String {
    std::fs::read_to_string(store.path()).expect("document written")
}
