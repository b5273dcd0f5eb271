mod common;

use common::*;
use meshsensor::directory::{DeviceDirectory, MeshCfgDirectory};
use meshsensor::document::{validate, Setting};
use meshsensor::mesh::{ModelId, PropertyTable};
use meshsensor::MeshSensorError;

const USER_DOCUMENT: &str = r#"
config_group:
  publication:
    default: {unicast_addr: "0xC000", app_key: 0, ttl: 5, period: 10000,
              retransmissions: {count: 1, interval: 50}}
  cadence: {}
elements:
  0x1001:
    model: SensorSetupServer
    app_key: 0
    device_unicat_addr: "1000"
    net_key: 0
    publication: {group: default}
    cadence: {}
  "0x1002":
    model: SensorSetupServer
    app_key: 0
    device_unicast_addr: "0x1000"
    net_key: 0
    publication: {}
    cadence:
      Temperature: {group: hourly}
"#;

#[tokio::test]
async fn user_written_document_is_normalised_on_persist() {
    let (_dir, store) = temp_store();
    tokio::fs::write(store.path(), USER_DOCUMENT).await.unwrap();

    let doc = store.load().await.unwrap();
    let first = doc.element(addr(0x1001)).unwrap();
    assert_eq!(first.device_unicast_addr, addr(0x1000));
    assert_eq!(first.publication, Some(Setting::GroupRef("default".into())));
    assert_eq!(doc.element(addr(0x1002)).unwrap().publication, None);

    store.persist(&doc).unwrap();
    let text = read(&store);
    assert!(text.contains("device_unicast_addr:"), "{text}");
    assert!(!text.contains("device_unicat_addr"));
    assert!(text.contains("0xc000"));
    assert!(text.contains("publication: {}"));
    assert_eq!(store.load().await.unwrap(), doc);
}

#[tokio::test]
async fn validate_reports_dangling_groups() {
    let (_dir, store) = temp_store();
    tokio::fs::write(store.path(), USER_DOCUMENT).await.unwrap();
    let doc = store.load().await.unwrap();

    let issues = validate(&doc, &PropertyTable::builtin());
    assert_eq!(issues.len(), 1, "{issues:?}");
    assert_eq!(issues[0].location, "elements.0x1002.cadence.Temperature");
    assert!(issues[0].message.contains("hourly"));
}

#[tokio::test]
async fn mixed_group_and_inline_fields_are_rejected() {
    let (_dir, store) = temp_store();
    let broken = USER_DOCUMENT.replace(
        "publication: {group: default}",
        "publication: {group: default, ttl: 3}",
    );
    tokio::fs::write(store.path(), broken).await.unwrap();
    match store.load().await {
        Err(MeshSensorError::Yaml { source, .. }) => {
            assert!(source.to_string().contains("group"), "{source}");
        }
        other => panic!("expected a yaml error, got {other:?}"),
    }
}

#[tokio::test]
async fn provisioning_database_lists_sensor_setup_servers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config_db.json");
    let db = r#"{
        "nodes": [
            {
                "unicastAddress": "1000",
                "netKeys": [{"index": 0}],
                "appKeys": [{"index": 1}],
                "elements": [
                    {"elementIndex": 0, "models": [{"modelId": "0000"}]},
                    {"elementIndex": 1, "models": [{"modelId": "1100"}, {"modelId": "1101", "bind": [4]}]},
                    {"elementIndex": 2, "models": [{"modelId": "1101"}]}
                ]
            }
        ]
    }"#;
    tokio::fs::write(&path, db).await.unwrap();

    let directory = MeshCfgDirectory::load(path.to_str().unwrap()).await.unwrap();
    let found = directory.elements(ModelId::SENSOR_SETUP_SERVER);
    let summary: Vec<_> = found.iter().map(|d| (d.address, d.device_address, d.app_key)).collect();
    assert_eq!(
        summary,
        vec![(addr(0x1001), addr(0x1000), 4), (addr(0x1002), addr(0x1000), 1)]
    );
}
