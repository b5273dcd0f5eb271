use thiserror::Error;

use crate::mesh::{AddressParseError, UnicastAddress};
use crate::transport::TransportError;

/// Errors surfaced by the document store, the directory adapter and the
/// reconciliation pipelines.
#[derive(Debug, Error)]
pub enum MeshSensorError {
    /// The sensor document (or another required file) does not exist.
    #[error("config file not found: {path}")]
    MissingConfigFile { path: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml error in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("json error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("toml error in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    InvalidAddress(#[from] AddressParseError),

    /// A `{group: name}` setting names a template that `config_group` does not define.
    #[error("{element}: group '{group}' is not defined in config_group.{kind}")]
    UnresolvableGroupReference {
        element: UnicastAddress,
        kind: &'static str,
        group: String,
    },

    #[error("unknown sensor property {0}")]
    UnknownProperty(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Another process holds the document lock.
    #[error("document {path} is locked by another run")]
    DocumentLocked { path: String },

    #[error("run interrupted")]
    Interrupted,
}

impl MeshSensorError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = MeshSensorError> = std::result::Result<T, E>;
