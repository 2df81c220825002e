//! Error taxonomy for chaos operations
//!
//! API failures wrap the underlying `kube::Error` together with the object
//! they addressed. Per-pod and per-action failures are logged by callers and
//! do not abort a batch; ledger-load and client-construction failures do.

use std::path::PathBuf;

use thiserror::Error;

pub type ChaosResult<T> = std::result::Result<T, ChaosError>;

#[derive(Debug, Error)]
pub enum ChaosError {
    #[error("failed to create kubernetes client: {0}")]
    Client(String),

    #[error("failed to list pods with selector '{selector}' in namespace '{namespace}': {source}")]
    ListPods {
        namespace: String,
        selector: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to get pod '{name}': {source}")]
    GetPod {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to patch ephemeral containers of pod '{name}': {source}")]
    PatchPod {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to delete pod '{name}': {source}")]
    DeletePod {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to get service '{name}': {source}")]
    GetService {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to get endpoints for service '{name}': {source}")]
    GetEndpoints {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to update endpoints for service '{name}': {source}")]
    UpdateEndpoints {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("ledger I/O failed on {path}: {source}")]
    LedgerIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger file {path} is not a valid action list: {source}")]
    LedgerParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("action not found in ledger: {0}")]
    ActionNotFound(String),

    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("unsupported method: {0}")]
    InvalidMethod(String),

    #[error("invalid netem value: {0}")]
    InvalidNetemValue(String),

    #[error("no endpoint backup found at {path}: {source}")]
    BackupMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("endpoint backup I/O failed on {path}: {source}")]
    BackupIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

impl ChaosError {
    /// True when the underlying API call failed with a 404
    pub fn is_not_found(&self) -> bool {
        let source = match self {
            ChaosError::GetPod { source, .. }
            | ChaosError::PatchPod { source, .. }
            | ChaosError::DeletePod { source, .. }
            | ChaosError::GetService { source, .. }
            | ChaosError::GetEndpoints { source, .. }
            | ChaosError::UpdateEndpoints { source, .. }
            | ChaosError::ListPods { source, .. } => source,
            _ => return false,
        };
        matches!(source, kube::Error::Api(e) if e.code == 404)
    }
}
