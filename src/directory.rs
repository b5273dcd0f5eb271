//! # Device Directory Adapter
//!
//! Read-only view of the provisioning database kept by the mesh
//! configuration client (`config_db.json`). The pipelines only need the
//! flat list of elements hosting a given model, together with the
//! addressing and key indices required to talk to them.
//!
//! ```json
//! {
//!   "nodes": [{
//!     "unicastAddress": "1000",
//!     "netKeys": [{"index": 0}],
//!     "appKeys": [{"index": 0}],
//!     "elements": [{"elementIndex": 1, "models": [{"modelId": "1101", "bind": [0]}]}]
//!   }]
//! }
//! ```

use log::{debug, warn};
use serde::Deserialize;
use tokio::fs;

use crate::error::{MeshSensorError, Result};
use crate::mesh::{parse_hex_u16, KeyIndex, ModelId, UnicastAddress};

/// One element hosting the requested model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDescriptor {
    pub address: UnicastAddress,
    /// Primary address of the owning node (configuration messages go here).
    pub device_address: UnicastAddress,
    pub net_key: KeyIndex,
    pub app_key: KeyIndex,
    pub model: ModelId,
}

/// Source of element descriptors.
pub trait DeviceDirectory {
    /// Elements hosting `model`, sorted by address.
    fn elements(&self, model: ModelId) -> Vec<ElementDescriptor>;
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    unicast_address: String,
    #[serde(default)]
    net_keys: Vec<RawKeyRef>,
    #[serde(default)]
    app_keys: Vec<RawKeyRef>,
    #[serde(default)]
    elements: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
struct RawKeyRef {
    index: KeyIndex,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawElement {
    #[serde(default)]
    element_index: u16,
    #[serde(default)]
    unicast_address: Option<String>,
    #[serde(default)]
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    model_id: String,
    #[serde(default)]
    bind: Vec<KeyIndex>,
}

/// Directory backed by a mesh-cfgclient JSON database.
///
/// Each element keeps its models with the first key bound to each one. The
/// descriptor's `app_key` holds the node's fallback key until a model is
/// asked for.
#[derive(Debug, Clone, Default)]
pub struct MeshCfgDirectory {
    elements: Vec<(ElementDescriptor, Vec<(ModelId, Option<KeyIndex>)>)>,
}

impl MeshCfgDirectory {
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MeshSensorError::MissingConfigFile {
                    path: path.to_string(),
                }
            } else {
                MeshSensorError::io(path, e)
            }
        })?;
        Self::from_json(path, &content)
    }

    pub fn from_json(path: &str, content: &str) -> Result<Self> {
        let raw: RawDatabase =
            serde_json::from_str(content).map_err(|source| MeshSensorError::Json {
                path: path.to_string(),
                source,
            })?;
        let mut elements = Vec::new();
        for node in raw.nodes {
            let Some(node_address) = parse_hex_u16(&node.unicast_address).map(UnicastAddress) else {
                warn!("{}: skipping node with bad unicastAddress '{}'", path, node.unicast_address);
                continue;
            };
            let Some(net_key) = node.net_keys.first().map(|k| k.index) else {
                warn!("{}: node {} has no network key, skipping", path, node_address);
                continue;
            };
            let node_app_key = node.app_keys.first().map(|k| k.index);
            for element in node.elements {
                let address = match element.unicast_address.as_deref() {
                    Some(text) => parse_hex_u16(text).map(UnicastAddress),
                    None => node_address.offset(element.element_index),
                };
                let Some(address) = address else {
                    warn!(
                        "{}: node {} element {} has no usable address, skipping",
                        path, node_address, element.element_index
                    );
                    continue;
                };
                let mut models = Vec::new();
                for model in &element.models {
                    match ModelId::from_hex(&model.model_id) {
                        Some(id) => models.push((id, model.bind.first().copied())),
                        None => debug!("{}: ignoring model id '{}'", path, model.model_id),
                    }
                }
                let descriptor = ElementDescriptor {
                    address,
                    device_address: node_address,
                    net_key,
                    app_key: node_app_key.unwrap_or(0),
                    model: ModelId(0),
                };
                elements.push((descriptor, models));
            }
        }
        Ok(Self { elements })
    }
}

impl DeviceDirectory for MeshCfgDirectory {
    fn elements(&self, model: ModelId) -> Vec<ElementDescriptor> {
        let mut found: Vec<ElementDescriptor> = self
            .elements
            .iter()
            .filter_map(|(descriptor, models)| {
                let (_, bound) = models.iter().find(|(id, _)| *id == model)?;
                Some(ElementDescriptor {
                    model,
                    app_key: bound.unwrap_or(descriptor.app_key),
                    ..descriptor.clone()
                })
            })
            .collect();
        found.sort_by_key(|d| d.address);
        found.dedup_by_key(|d| d.address);
        found
    }
}

/// Fixed list of descriptors, used by tests and the simulated mesh.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory(pub Vec<ElementDescriptor>);

impl DeviceDirectory for StaticDirectory {
    fn elements(&self, model: ModelId) -> Vec<ElementDescriptor> {
        let mut found: Vec<_> = self.0.iter().filter(|d| d.model == model).cloned().collect();
        found.sort_by_key(|d| d.address);
        found
    }
}
