//! # Tool Configuration
//!
//! Settings that belong to the tool rather than to the sensors: where the
//! sensor document and the provisioning database live, how to reach the mesh
//! gateway, request pacing, logging, and extra sensor property names.
//!
//! ```toml
//! [paths]
//! document = "./mesh_sensor_config.yaml"
//! directory_db = "~/.config/meshcfg/config_db.json"
//!
//! [transport]
//! gateway = "127.0.0.1:7450"
//! send_interval_ms = 500
//! timeout_ms = 10000
//! connect_timeout_ms = 3000
//!
//! [logging]
//! level = "info"
//! # file = "meshsensor.log"
//!
//! [properties]
//! ambient_light = 0x004e
//! ```
//!
//! The file is optional. `meshsensor init` writes the defaults.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::fs;
use tokio::time::Duration;

use crate::error::MeshSensorError;
use crate::mesh::PropertyTable;
use crate::transport::CallParams;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Extra or renamed sensor properties: canonical name -> property id.
    #[serde(default)]
    pub properties: HashMap<String, u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_document")]
    pub document: String,
    #[serde(default = "default_directory_db")]
    pub directory_db: String,
}

fn default_document() -> String {
    "./mesh_sensor_config.yaml".to_string()
}

fn default_directory_db() -> String {
    "~/.config/meshcfg/config_db.json".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            document: default_document(),
            directory_db: default_directory_db(),
        }
    }
}

impl PathsConfig {
    /// Provisioning database path with a leading `~/` expanded from `$HOME`.
    pub fn directory_db_path(&self) -> String {
        expand_home(&self.directory_db)
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) if !home.is_empty() => {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        }
        _ => path.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// `host:port` of the JSON-lines mesh gateway.
    #[serde(default = "default_gateway")]
    pub gateway: String,
    /// Minimum gap between two transmissions on the mesh.
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    /// Deadline for one request/response exchange.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_gateway() -> String {
    "127.0.0.1:7450".to_string()
}

fn default_send_interval_ms() -> u64 {
    500
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            gateway: default_gateway(),
            send_interval_ms: default_send_interval_ms(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Append-only log file. Without one every record goes to stderr.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content).map_err(|source| MeshSensorError::Toml {
            path: path.to_string(),
            source,
        })?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn call_params(&self) -> CallParams {
        CallParams {
            send_interval: Duration::from_millis(self.transport.send_interval_ms),
            timeout: Duration::from_millis(self.transport.timeout_ms),
        }
    }

    pub fn property_table(&self) -> PropertyTable {
        PropertyTable::with_overrides(&self.properties)
    }
}
