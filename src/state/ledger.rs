//! Action ledger backed by a pretty-printed JSON array on disk

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::action::ChaosAction;
use crate::error::{ChaosError, ChaosResult};

/// Durable list of performed actions.
///
/// Every mutator holds `lock` for the full load, mutate, write cycle so two
/// tasks in this process never lose each other's update. Separate processes
/// writing the same file are not coordinated.
#[derive(Debug)]
pub struct ActionLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ActionLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an action, stamping it with the current time if it has none.
    /// Returns the action exactly as persisted.
    pub fn save(&self, mut action: ChaosAction) -> ChaosResult<ChaosAction> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        action.stamp_if_missing();
        let mut actions = self.read()?;
        actions.push(action.clone());
        self.write(&actions)?;

        debug!(
            action_type = %action.action_type,
            target = %action.target_pod,
            path = %self.path.display(),
            "Recorded action"
        );
        Ok(action)
    }

    /// All recorded actions in insertion order. A missing or empty file is an
    /// empty ledger; anything else that is not a JSON array of actions fails.
    pub fn load(&self) -> ChaosResult<Vec<ChaosAction>> {
        self.read()
    }

    /// Remove the first entry equal to `action` in every field
    pub fn delete(&self, action: &ChaosAction) -> ChaosResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut actions = self.read()?;
        let index = actions
            .iter()
            .position(|candidate| candidate == action)
            .ok_or_else(|| {
                ChaosError::ActionNotFound(format!(
                    "{} action for '{}' in namespace '{}' at {}",
                    action.action_type, action.target_pod, action.namespace, action.timestamp
                ))
            })?;
        actions.remove(index);
        self.write(&actions)
    }

    /// Replace the ledger with an empty array
    pub fn clear(&self) -> ChaosResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write(&[])
    }

    fn read(&self) -> ChaosResult<Vec<ChaosAction>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ChaosError::LedgerIo {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if data.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&data).map_err(|source| ChaosError::LedgerParse {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, actions: &[ChaosAction]) -> ChaosResult<()> {
        let io_err = |source| ChaosError::LedgerIo {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let data = serde_json::to_vec_pretty(actions)?;

        // Write beside the target and rename so a crash never leaves half an array
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}
