//! Chaos operations against a live cluster
//!
//! Integrates with the Kubernetes API directly, no CRDs or sidecars:
//! - Latency and packet loss via netem inside an ephemeral container
//! - CPU stress via an ephemeral container
//! - Pod kill
//! - Service misrouting by rewriting Endpoints
//!
//! Every successful, non-dry-run operation is recorded in the action ledger
//! so it can be rolled back later.

mod injector;
mod kill;
mod misroute;
mod types;

pub use injector::spawn_completion_timer;
pub use kill::select_distinct_indices;
pub use types::*;

use tracing::warn;

use crate::k8s::ClusterApi;
use crate::state::{ActionLedger, BackupStore, ChaosAction};

/// Everything one chaos command needs, passed explicitly
#[derive(Clone, Copy)]
pub struct ChaosContext<'a> {
    pub client: &'a dyn ClusterApi,
    pub ledger: &'a ActionLedger,
    pub backups: &'a BackupStore,
    pub dry_run: bool,
}

impl<'a> ChaosContext<'a> {
    pub fn new(
        client: &'a dyn ClusterApi,
        ledger: &'a ActionLedger,
        backups: &'a BackupStore,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            ledger,
            backups,
            dry_run,
        }
    }

    /// Persist an action; the chaos itself already happened, so a ledger
    /// failure is reported but does not fail the operation
    pub(crate) fn record(&self, action: ChaosAction) {
        let target = action.target_pod.clone();
        if let Err(e) = self.ledger.save(action) {
            warn!(target = %target, "Failed to save state: {}", e);
        }
    }
}
