//! # Document Store
//!
//! Loads and persists the sensor [`ConfigDocument`].
//!
//! Writes are atomic: the YAML is written to a unique temp file next to the
//! document, synced, and renamed over the destination, so a crash mid-write
//! leaves either the old or the new document on disk. A Get run also takes
//! an exclusive advisory lock on `<document>.lock` for as long as it owns
//! the document; a second run fails fast with
//! [`MeshSensorError::DocumentLocked`].

use fs2::FileExt;
use log::{debug, info};
use std::fs::{self as sfs, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::document::ConfigDocument;
use crate::error::{MeshSensorError, Result};

#[derive(Debug, Clone)]
pub struct DocumentStore {
    path: String,
}

/// Held while a run owns the document. Dropping it releases the lock.
#[derive(Debug)]
pub struct DocumentLock {
    file: File,
    path: PathBuf,
}

impl Drop for DocumentLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!("Released document lock {}", self.path.display());
    }
}

impl DocumentStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.lock", self.path))
    }

    /// Read and parse the document. An empty file is an empty document.
    pub async fn load(&self) -> Result<ConfigDocument> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MeshSensorError::MissingConfigFile {
                    path: self.path.clone(),
                }
            } else {
                MeshSensorError::io(&self.path, e)
            }
        })?;
        if content.trim().is_empty() {
            return Ok(ConfigDocument::default());
        }
        serde_yaml::from_str(&content).map_err(|source| MeshSensorError::Yaml {
            path: self.path.clone(),
            source,
        })
    }

    /// Like [`load`](Self::load), but a missing file starts a new document.
    pub async fn load_or_default(&self) -> Result<ConfigDocument> {
        match self.load().await {
            Err(MeshSensorError::MissingConfigFile { path }) => {
                info!("{} does not exist yet, starting a new document", path);
                Ok(ConfigDocument::default())
            }
            other => other,
        }
    }

    /// Take the exclusive writer lock without blocking.
    pub fn lock(&self) -> Result<DocumentLock> {
        let path = self.lock_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            sfs::create_dir_all(parent).map_err(|e| MeshSensorError::io(&self.path, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| MeshSensorError::io(path.display().to_string(), e))?;
        if file.try_lock_exclusive().is_err() {
            return Err(MeshSensorError::DocumentLocked {
                path: self.path.clone(),
            });
        }
        debug!("Acquired document lock {}", path.display());
        Ok(DocumentLock { file, path })
    }

    /// Atomically replace the document on disk with `doc`.
    pub fn persist(&self, doc: &ConfigDocument) -> Result<()> {
        let content = serde_yaml::to_string(doc).map_err(|source| MeshSensorError::Yaml {
            path: self.path.clone(),
            source,
        })?;
        let path = Path::new(&self.path);
        let io_err = |e: std::io::Error| MeshSensorError::io(&self.path, e);

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                sfs::create_dir_all(parent).map_err(io_err)?;
                parent
            }
            _ => Path::new("."),
        };
        let base = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("mesh_sensor_config.yaml");

        let mut counter = 0u32;
        let (tmp, tmp_path) = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(tmp) => break (tmp, candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                }
                Err(e) => return Err(io_err(e)),
            }
        };

        // the temp file never outlives a failed write, sync or rename
        let replaced =
            write_synced(tmp, content.as_bytes()).and_then(|()| sfs::rename(&tmp_path, path));
        if let Err(e) = replaced {
            let _ = sfs::remove_file(&tmp_path);
            return Err(io_err(e));
        }
        if let Ok(dir_file) = File::open(dir) {
            let _ = dir_file.sync_all();
        }
        info!("Wrote {} element(s) to {}", doc.elements.len(), self.path);
        Ok(())
    }
}

fn write_synced(mut file: File, content: &[u8]) -> std::io::Result<()> {
    file.write_all(content)?;
    file.flush()?;
    file.sync_all()
}
