//! In-memory mesh used by tests and `--simulate` runs.
//!
//! The simulated devices answer every request instantly from their stored
//! state. Faults can be injected per element and operation; a faulted call
//! fails with [`TransportError::Timeout`] exactly as an unanswered request
//! would. Every call is recorded so tests can assert on what was sent.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{
    CadenceSet, CadenceStatus, CallParams, Pacer, PublicationGet, PublicationSet,
    PublicationStatus, SensorDescriptor, TransportClient, TransportError,
};
use crate::directory::{ElementDescriptor, StaticDirectory};
use crate::document::{Cadence, Publication};
use crate::error::{MeshSensorError, Result};
use crate::mesh::{KeyIndex, ModelId, UnicastAddress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    PublicationGet,
    PublicationSet,
    DescriptorGet,
    CadenceGet,
    CadenceSet,
}

/// One request as seen by the simulated mesh.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    PublicationGet(PublicationGet),
    PublicationSet(PublicationSet),
    DescriptorGet { element: UnicastAddress, app_key: KeyIndex },
    CadenceGet { element: UnicastAddress, app_key: KeyIndex, property_id: u16 },
    CadenceSet(CadenceSet),
}

impl Call {
    pub fn element(&self) -> UnicastAddress {
        match self {
            Call::PublicationGet(req) => req.element_address,
            Call::PublicationSet(req) => req.element_address,
            Call::DescriptorGet { element, .. } | Call::CadenceGet { element, .. } => *element,
            Call::CadenceSet(req) => req.destination,
        }
    }
}

/// State of one simulated sensor element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimElement {
    pub device_address: UnicastAddress,
    #[serde(default)]
    pub net_key: KeyIndex,
    #[serde(default)]
    pub app_key: KeyIndex,
    #[serde(default)]
    pub publication: Option<Publication>,
    /// Declared sensor properties and their cadence (`None`: no cadence support).
    #[serde(default)]
    pub sensors: BTreeMap<u16, Option<Cadence>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    #[serde(default)]
    pub elements: BTreeMap<UnicastAddress, SimElement>,
}

#[derive(Debug, Default)]
pub struct SimulatedMesh {
    pub state: SimState,
    faults: BTreeSet<(UnicastAddress, Operation, Option<u16>)>,
    calls: Vec<Call>,
    pacer: Pacer,
}

const PUBLICATION_DISABLED: Publication = Publication {
    unicast_addr: UnicastAddress(0x0000),
    app_key: 0,
    ttl: 0,
    period: 0,
    retransmissions: crate::document::Retransmissions {
        count: 0,
        interval: 50,
    },
};

impl SimulatedMesh {
    pub fn new(state: SimState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MeshSensorError::MissingConfigFile {
                    path: path.to_string(),
                }
            } else {
                MeshSensorError::io(path, e)
            }
        })?;
        let state = serde_yaml::from_str(&content).map_err(|source| MeshSensorError::Yaml {
            path: path.to_string(),
            source,
        })?;
        Ok(Self::new(state))
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let content = serde_yaml::to_string(&self.state).map_err(|source| MeshSensorError::Yaml {
            path: path.to_string(),
            source,
        })?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| MeshSensorError::io(path, e))
    }

    /// Directory listing every simulated element as a Sensor Setup Server.
    pub fn directory(&self) -> StaticDirectory {
        StaticDirectory(
            self.state
                .elements
                .iter()
                .map(|(address, element)| ElementDescriptor {
                    address: *address,
                    device_address: element.device_address,
                    net_key: element.net_key,
                    app_key: element.app_key,
                    model: ModelId::SENSOR_SETUP_SERVER,
                })
                .collect(),
        )
    }

    /// Make `operation` on `element` time out. For cadence operations
    /// `property` narrows the fault to one property.
    pub fn fail(&mut self, element: UnicastAddress, operation: Operation, property: Option<u16>) {
        self.faults.insert((element, operation, property));
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    fn faulted(&self, element: UnicastAddress, operation: Operation, property: Option<u16>) -> bool {
        self.faults.contains(&(element, operation, None))
            || (property.is_some() && self.faults.contains(&(element, operation, property)))
    }

    fn element_mut(&mut self, address: UnicastAddress) -> Option<&mut SimElement> {
        self.state.elements.get_mut(&address)
    }

    async fn answer<T>(
        &mut self,
        call: Call,
        operation: Operation,
        property: Option<u16>,
        params: CallParams,
        respond: impl FnOnce(&mut Self) -> Option<T>,
    ) -> Result<T, TransportError> {
        let element = call.element();
        self.calls.push(call);
        let outcome = if self.faulted(element, operation, property) {
            None
        } else {
            respond(self)
        };
        self.pacer
            .run(params, async move {
                outcome.ok_or(TransportError::Timeout(params.timeout))
            })
            .await
    }
}

impl TransportClient for SimulatedMesh {
    async fn get_publication(
        &mut self,
        request: &PublicationGet,
        params: CallParams,
    ) -> Result<PublicationStatus, TransportError> {
        let request = *request;
        self.answer(
            Call::PublicationGet(request),
            Operation::PublicationGet,
            None,
            params,
            |mesh| {
                let element = mesh.element_mut(request.element_address)?;
                Some(PublicationStatus {
                    status: 0,
                    element_address: request.element_address,
                    model: request.model,
                    publication: element.publication.unwrap_or(PUBLICATION_DISABLED),
                })
            },
        )
        .await
    }

    async fn set_publication(
        &mut self,
        request: &PublicationSet,
        params: CallParams,
    ) -> Result<PublicationStatus, TransportError> {
        let request = *request;
        self.answer(
            Call::PublicationSet(request),
            Operation::PublicationSet,
            None,
            params,
            |mesh| {
                let element = mesh.element_mut(request.element_address)?;
                element.publication = Some(request.publication);
                Some(PublicationStatus {
                    status: 0,
                    element_address: request.element_address,
                    model: request.model,
                    publication: request.publication,
                })
            },
        )
        .await
    }

    async fn descriptor_get(
        &mut self,
        element: UnicastAddress,
        app_key: KeyIndex,
        params: CallParams,
    ) -> Result<Vec<SensorDescriptor>, TransportError> {
        self.answer(
            Call::DescriptorGet { element, app_key },
            Operation::DescriptorGet,
            None,
            params,
            |mesh| {
                let state = mesh.element_mut(element)?;
                Some(state.sensors.keys().copied().map(SensorDescriptor::new).collect())
            },
        )
        .await
    }

    async fn cadence_get(
        &mut self,
        element: UnicastAddress,
        app_key: KeyIndex,
        property_id: u16,
        params: CallParams,
    ) -> Result<CadenceStatus, TransportError> {
        self.answer(
            Call::CadenceGet {
                element,
                app_key,
                property_id,
            },
            Operation::CadenceGet,
            Some(property_id),
            params,
            |mesh| {
                let state = mesh.element_mut(element)?;
                let cadence = state.sensors.get(&property_id).copied().flatten();
                Some(CadenceStatus {
                    property_id,
                    cadence,
                })
            },
        )
        .await
    }

    async fn cadence_set(
        &mut self,
        request: &CadenceSet,
        params: CallParams,
    ) -> Result<CadenceStatus, TransportError> {
        let request = *request;
        self.answer(
            Call::CadenceSet(request),
            Operation::CadenceSet,
            Some(request.property_id),
            params,
            |mesh| {
                let state = mesh.element_mut(request.destination)?;
                state
                    .sensors
                    .insert(request.property_id, Some(request.cadence));
                Some(CadenceStatus {
                    property_id: request.property_id,
                    cadence: Some(request.cadence),
                })
            },
        )
        .await
    }
}
