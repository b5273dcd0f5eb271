//! # Transport Boundary
//!
//! The pipelines never speak the mesh protocol themselves. They go through
//! [`TransportClient`], a small request/response surface covering the five
//! messages this tool needs:
//!
//! - Config Model Publication Get / Set (to the owning node)
//! - Sensor Descriptor Get, Sensor Cadence Get / Set (to the element)
//!
//! Every call carries [`CallParams`]: the pacing interval enforced before
//! the transmission and the deadline after which the call is abandoned with
//! [`TransportError::Timeout`]. Implementations own a [`Pacer`] so that the
//! gap between consecutive transmissions holds regardless of call outcome.
//!
//! Two implementations ship with the crate:
//!
//! - [`gateway::GatewayClient`] - newline-delimited JSON over TCP to a bridge
//!   process that owns the actual mesh stack
//! - [`sim::SimulatedMesh`] - in-memory devices for tests and dry runs

pub mod gateway;
pub mod pacing;
pub mod sim;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;

use crate::document::{Cadence, Publication};
use crate::mesh::{KeyIndex, ModelId, UnicastAddress};

pub use pacing::Pacer;

/// Pacing and deadline applied to a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallParams {
    pub send_interval: Duration,
    pub timeout: Duration,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            send_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("device rejected the request with status 0x{0:02x}")]
    Rejected(u8),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("gateway error: {0}")]
    Remote(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationGet {
    /// Primary address of the node hosting the element.
    pub destination: UnicastAddress,
    pub net_key: KeyIndex,
    pub element_address: UnicastAddress,
    pub model: ModelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationSet {
    pub destination: UnicastAddress,
    pub net_key: KeyIndex,
    pub element_address: UnicastAddress,
    pub model: ModelId,
    pub publication: Publication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationStatus {
    pub status: u8,
    pub element_address: UnicastAddress,
    pub model: ModelId,
    pub publication: Publication,
}

impl PublicationStatus {
    /// Turn a non-zero status code into [`TransportError::Rejected`].
    pub fn into_result(self) -> Result<Self, TransportError> {
        if self.status == 0 {
            Ok(self)
        } else {
            Err(TransportError::Rejected(self.status))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub property_id: u16,
    #[serde(default)]
    pub positive_tolerance: u16,
    #[serde(default)]
    pub negative_tolerance: u16,
    #[serde(default)]
    pub sampling_function: u8,
    #[serde(default)]
    pub measurement_period: u8,
    #[serde(default)]
    pub update_interval: u8,
}

impl SensorDescriptor {
    pub fn new(property_id: u16) -> Self {
        Self {
            property_id,
            positive_tolerance: 0,
            negative_tolerance: 0,
            sampling_function: 0,
            measurement_period: 0,
            update_interval: 0,
        }
    }
}

/// Cadence status for one property. `cadence` is `None` when the device
/// knows the property but does not support cadence for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CadenceStatus {
    pub property_id: u16,
    #[serde(default)]
    pub cadence: Option<Cadence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CadenceSet {
    /// Element address; cadence is a Sensor Setup Server state.
    pub destination: UnicastAddress,
    pub app_key: KeyIndex,
    pub property_id: u16,
    pub cadence: Cadence,
}

/// Request/response access to the mesh. Calls are issued one at a time.
#[allow(async_fn_in_trait)]
pub trait TransportClient {
    async fn get_publication(
        &mut self,
        request: &PublicationGet,
        params: CallParams,
    ) -> Result<PublicationStatus, TransportError>;

    async fn set_publication(
        &mut self,
        request: &PublicationSet,
        params: CallParams,
    ) -> Result<PublicationStatus, TransportError>;

    async fn descriptor_get(
        &mut self,
        element: UnicastAddress,
        app_key: KeyIndex,
        params: CallParams,
    ) -> Result<Vec<SensorDescriptor>, TransportError>;

    async fn cadence_get(
        &mut self,
        element: UnicastAddress,
        app_key: KeyIndex,
        property_id: u16,
        params: CallParams,
    ) -> Result<CadenceStatus, TransportError>;

    async fn cadence_set(
        &mut self,
        request: &CadenceSet,
        params: CallParams,
    ) -> Result<CadenceStatus, TransportError>;
}
