mod common;

use common::*;
use meshsensor::document::TriggerType;
use meshsensor::pipeline::{run_set, RunOptions, StopFlag};
use meshsensor::transport::sim::{Call, Operation};
use meshsensor::transport::CadenceSet;
use meshsensor::MeshSensorError;

const DOCUMENT: &str = r#"
config_group:
  publication:
    default: {unicast_addr: "0xc000", app_key: 0, ttl: 5, period: 10000,
              retransmissions: {count: 1, interval: 50}}
  cadence:
    default: {fast_cadence_period_divisor: 2, status_trigger_type: percent,
              status_trigger_delta_down: 5, status_trigger_delta_up: 7,
              status_min_interval: 10, fast_cadence_low: 0,
              fast_cadence_high: 100}
elements:
  "0x1001":
    model: SensorSetupServer
    app_key: 0
    device_unicast_addr: "0x1000"
    net_key: 0
    publication: {}
    cadence:
      temperature: {group: default}
"#;

async fn store_with(content: &str) -> (tempfile::TempDir, meshsensor::store::DocumentStore) {
    let (dir, store) = temp_store();
    tokio::fs::write(store.path(), content).await.unwrap();
    (dir, store)
}

#[tokio::test]
async fn group_cadence_is_pushed_with_exactly_the_template_fields() {
    let (_dir, store) = store_with(DOCUMENT).await;
    let mut mesh = three_element_mesh();

    let report = run_set(&store, &mut mesh, &fast_options(), &StopFlag::new())
        .await
        .unwrap();
    assert!(report.is_clean(), "{report}");

    let calls = mesh.take_calls();
    assert_eq!(calls.len(), 1, "{calls:?}");
    let Call::CadenceSet(CadenceSet {
        destination,
        app_key,
        property_id,
        cadence,
    }) = calls[0]
    else {
        panic!("unexpected call {:?}", calls[0]);
    };
    assert_eq!(destination, addr(0x1001));
    assert_eq!(app_key, 0);
    assert_eq!(property_id, TEMPERATURE);
    assert_eq!(cadence.fast_cadence_period_divisor, 2);
    assert_eq!(cadence.status_trigger_type, TriggerType::Percent);
    assert_eq!(cadence.status_trigger_delta_down, 5.0);
    assert_eq!(cadence.status_trigger_delta_up, 7.0);
    assert_eq!(cadence.status_min_interval, 10);
    assert_eq!(cadence.fast_cadence_low, 0.0);
    assert_eq!(cadence.fast_cadence_high, 100.0);
}

#[tokio::test]
async fn set_never_modifies_the_document() {
    let (_dir, store) = store_with(DOCUMENT).await;
    let mut mesh = three_element_mesh();
    run_set(&store, &mut mesh, &fast_options(), &StopFlag::new())
        .await
        .unwrap();
    assert_eq!(read(&store), DOCUMENT);
}

#[tokio::test]
async fn publication_goes_to_the_owning_node() {
    let content = DOCUMENT.replace("publication: {}", "publication: {group: default}");
    let (_dir, store) = store_with(&content).await;
    let mut mesh = three_element_mesh();
    run_set(&store, &mut mesh, &fast_options(), &StopFlag::new())
        .await
        .unwrap();

    let set = mesh
        .calls()
        .iter()
        .find_map(|call| match call {
            Call::PublicationSet(request) => Some(*request),
            _ => None,
        })
        .expect("publication pushed");
    assert_eq!(set.destination, addr(0x1000));
    assert_eq!(set.element_address, addr(0x1001));
    assert_eq!(set.publication, publication(5, 10_000));
    assert_eq!(
        mesh.state.elements[&addr(0x1001)].publication,
        Some(publication(5, 10_000))
    );
}

#[tokio::test]
async fn unresolvable_group_is_skipped_and_the_rest_still_runs() {
    let content = format!(
        "{}{}",
        DOCUMENT.replace("publication: {}", "publication: {group: missing}"),
        r#"  "0x2001":
    model: SensorSetupServer
    app_key: 0
    device_unicast_addr: "0x2000"
    net_key: 0
    publication: {group: default}
    cadence: {}
"#
    );
    let (_dir, store) = store_with(&content).await;
    let mut mesh = three_element_mesh();

    let report = run_set(&store, &mut mesh, &fast_options(), &StopFlag::new())
        .await
        .unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert!(!report.is_clean());

    let published: Vec<_> = mesh
        .calls()
        .iter()
        .filter(|call| matches!(call, Call::PublicationSet(_)))
        .map(|call| call.element())
        .collect();
    assert_eq!(published, vec![addr(0x2001)]);
    assert!(mesh
        .calls()
        .iter()
        .any(|call| matches!(call, Call::CadenceSet(set) if set.destination == addr(0x1001))));
}

#[tokio::test]
async fn failing_property_does_not_block_the_next_one() {
    let content = DOCUMENT.replace(
        "      temperature: {group: default}\n",
        "      temperature: {group: default}\n      humidity: {group: default}\n",
    );
    let (_dir, store) = store_with(&content).await;
    let mut mesh = three_element_mesh();
    mesh.fail(addr(0x1001), Operation::CadenceSet, Some(TEMPERATURE));

    let report = run_set(&store, &mut mesh, &fast_options(), &StopFlag::new())
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    let humidity = mesh.state.elements[&addr(0x1001)].sensors[&HUMIDITY].unwrap();
    assert_eq!(humidity.status_trigger_type, TriggerType::Percent);
    let temperature = mesh.state.elements[&addr(0x1001)].sensors[&TEMPERATURE].unwrap();
    assert_eq!(temperature, cadence(5.0));
}

#[tokio::test]
async fn filter_limits_the_push_to_one_element() {
    let content = DOCUMENT.replace("publication: {}", "publication: {group: default}")
        + r#"  "0x2001":
    model: SensorSetupServer
    app_key: 0
    device_unicast_addr: "0x2000"
    net_key: 0
    publication: {group: default}
    cadence: {}
"#;
    let (_dir, store) = store_with(&content).await;
    let mut mesh = three_element_mesh();
    let options = RunOptions {
        filter: Some(addr(0x2001)),
        ..fast_options()
    };
    let report = run_set(&store, &mut mesh, &options, &StopFlag::new())
        .await
        .unwrap();
    assert_eq!(report.elements, 1);
    assert!(mesh.calls().iter().all(|call| call.element() == addr(0x2001)));
}

#[tokio::test]
async fn missing_document_fails_the_run() {
    let (_dir, store) = temp_store();
    let mut mesh = three_element_mesh();
    let result = run_set(&store, &mut mesh, &fast_options(), &StopFlag::new()).await;
    assert!(matches!(result, Err(MeshSensorError::MissingConfigFile { .. })));
    assert!(mesh.calls().is_empty());
}
