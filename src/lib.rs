//! # meshsensor - Sensor Publication and Cadence for Bluetooth Mesh
//!
//! meshsensor keeps the reporting behaviour of Bluetooth mesh sensor
//! elements in a human-editable YAML document and reconciles it with the
//! devices in both directions:
//!
//! - **Get** reads each element's model publication and per-property sensor
//!   cadence from the mesh and merges them into the document. Settings that
//!   refer to a named group template stay that way as long as the device
//!   still matches the template.
//! - **Set** resolves every stored setting (inline or through its group) and
//!   pushes the concrete values back to the devices.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshsensor::config::Config;
//! use meshsensor::directory::MeshCfgDirectory;
//! use meshsensor::pipeline::{run_get, RunOptions, StopFlag};
//! use meshsensor::store::DocumentStore;
//! use meshsensor::transport::gateway::GatewayClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("meshsensor.toml").await?;
//!     let directory = MeshCfgDirectory::load(&config.paths.directory_db_path()).await?;
//!     let mut gateway = GatewayClient::connect(
//!         &config.transport.gateway,
//!         config.transport.connect_timeout(),
//!     )
//!     .await?;
//!     let options = RunOptions {
//!         params: config.call_params(),
//!         properties: config.property_table(),
//!         ..RunOptions::default()
//!     };
//!     let store = DocumentStore::new(config.paths.document.clone());
//!     run_get(&store, &directory, &mut gateway, &options, &StopFlag::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`mesh`] - addresses, model ids and the sensor property table
//! - [`document`] - the YAML document model and its validation
//! - [`resolver`] - group reference resolution for both directions
//! - [`pipeline`] - the Get and Set runs
//! - [`transport`] - mesh access: gateway client, simulated mesh, pacing
//! - [`directory`] - provisioning database adapter
//! - [`store`] - atomic document persistence and the writer lock
//! - [`config`] - tool configuration (TOML)

pub mod config;
pub mod directory;
pub mod document;
pub mod error;
pub mod logutil;
pub mod mesh;
pub mod pipeline;
pub mod resolver;
pub mod store;
pub mod transport;

pub use error::{MeshSensorError, Result};
