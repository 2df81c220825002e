//! Endpoints snapshots for misroute rollback

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use k8s_openapi::api::core::v1::Endpoints;
use tracing::info;

use crate::error::{ChaosError, ChaosResult};

/// Stores one snapshot per `(service, namespace)` at
/// `{dir}/{service}_{namespace}.json`
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, service: &str, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.json", service, namespace))
    }

    /// Write the snapshot, replacing any earlier one for the same service
    pub fn save(&self, endpoints: &Endpoints, service: &str, namespace: &str) -> ChaosResult<PathBuf> {
        let path = self.path_for(service, namespace);
        let io_err = |source| ChaosError::BackupIo {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let data = serde_json::to_vec_pretty(endpoints)?;
        fs::write(&path, data).map_err(io_err)?;

        info!(path = %path.display(), "Saved original endpoints for rollback");
        Ok(path)
    }

    /// Read a snapshot; a missing file is [`ChaosError::BackupMissing`]
    pub fn load(&self, path: &Path) -> ChaosResult<Endpoints> {
        let data = fs::read(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ChaosError::BackupMissing {
                    path: path.to_path_buf(),
                    source,
                }
            } else {
                ChaosError::BackupIo {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn remove(&self, path: &Path) -> ChaosResult<()> {
        fs::remove_file(path).map_err(|source| ChaosError::BackupIo {
            path: path.to_path_buf(),
            source,
        })
    }
}
