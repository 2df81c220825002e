//! Rollback of recorded chaos actions
//!
//! Loads the ledger, narrows it with the type/pod filters and reverses each
//! action in turn. A reversed action is removed from the ledger right away,
//! so an interrupted run keeps its progress. A failed action stays in the
//! ledger and never stops the rest of the batch.

use std::path::PathBuf;

use k8s_openapi::api::core::v1::EphemeralContainer;
use tracing::{error, info, warn};

use crate::chaos::{ChaosContext, ChaosType};
use crate::error::{ChaosError, ChaosResult};
use crate::k8s::resources::{
    carries_action_id, existing_ephemeral_containers, CPU_STRESS_PREFIX, GENERIC_MARKER,
    LATENCY_PREFIX, PACKETLOSS_PREFIX,
};
use crate::state::{meta, ChaosAction};

const NETEM_MARKERS: &[&str] = &[LATENCY_PREFIX, PACKETLOSS_PREFIX, GENERIC_MARKER];
const CPU_STRESS_MARKERS: &[&str] = &[CPU_STRESS_PREFIX, GENERIC_MARKER];

/// Narrows which ledger entries a rollback touches. Both filters must match
/// when both are set; `None` or an empty string matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackFilter {
    pub action_type: Option<String>,
    pub pod: Option<String>,
}

impl RollbackFilter {
    pub fn new(action_type: Option<String>, pod: Option<String>) -> Self {
        Self { action_type, pod }
    }

    pub fn matches(&self, action: &ChaosAction) -> bool {
        let type_ok = match self.action_type.as_deref() {
            Some(t) if !t.is_empty() => action.action_type == t,
            _ => true,
        };
        let pod_ok = match self.pod.as_deref() {
            Some(p) if !p.is_empty() => action.target_pod == p,
            _ => true,
        };
        type_ok && pod_ok
    }
}

/// Apply a filter, preserving ledger order
pub fn filter_actions(actions: &[ChaosAction], filter: &RollbackFilter) -> Vec<ChaosAction> {
    actions
        .iter()
        .filter(|action| filter.matches(action))
        .cloned()
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RollbackSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct RollbackEngine<'a> {
    ctx: ChaosContext<'a>,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(ctx: ChaosContext<'a>) -> Self {
        Self { ctx }
    }

    /// Reverse every ledger entry matching `filter`.
    ///
    /// Only a ledger load failure is returned as an error; per-action
    /// failures are counted in the summary.
    pub async fn rollback_all(&self, filter: &RollbackFilter) -> ChaosResult<RollbackSummary> {
        info!("Starting rollback operation");

        let actions = self.ctx.ledger.load()?;
        let selected = filter_actions(&actions, filter);
        if selected.is_empty() {
            info!("No actions found to rollback");
            return Ok(RollbackSummary::default());
        }
        info!("Found {} action(s) to rollback", selected.len());

        let mut summary = RollbackSummary {
            attempted: selected.len(),
            ..Default::default()
        };

        for action in &selected {
            info!(
                action_type = %action.action_type,
                target = %action.target_pod,
                namespace = %action.namespace,
                "Rolling back action"
            );

            match self.rollback_action(action).await {
                Ok(()) => {
                    summary.succeeded += 1;
                    if !self.ctx.dry_run {
                        if let Err(e) = self.ctx.ledger.delete(action) {
                            warn!("Failed to remove action from state: {}", e);
                        }
                    }
                }
                Err(e) => {
                    error!(target = %action.target_pod, "Failed to rollback action: {}", e);
                    summary.failed += 1;
                }
            }
        }

        if self.ctx.dry_run {
            info!(
                "Dry run completed: {} action(s) would be rolled back",
                summary.attempted
            );
        } else {
            info!(
                "Rollback completed: {} successful, {} failed",
                summary.succeeded, summary.failed
            );
            if summary.failed > 0 {
                warn!("Failed to rollback {} action(s)", summary.failed);
            }
        }

        Ok(summary)
    }

    /// Reverse a single action according to its type
    pub async fn rollback_action(&self, action: &ChaosAction) -> ChaosResult<()> {
        match action.kind()? {
            ChaosType::Latency | ChaosType::PacketLoss => {
                self.remove_injectors(action, NETEM_MARKERS).await
            }
            ChaosType::CpuStress => self.remove_injectors(action, CPU_STRESS_MARKERS).await,
            ChaosType::Misroute => self.restore_endpoints(action).await,
            ChaosType::Kill => {
                // A deleted pod cannot come back; report success so the entry
                // can leave the ledger
                warn!(
                    pod = %action.target_pod,
                    namespace = %action.namespace,
                    "Cannot rollback kill action - pod was permanently deleted"
                );
                if self.ctx.dry_run {
                    info!(dry_run = true, "Would skip kill action for pod '{}'", action.target_pod);
                }
                Ok(())
            }
        }
    }

    /// Drop this tool's ephemeral containers from the action's pod
    async fn remove_injectors(&self, action: &ChaosAction, markers: &[&str]) -> ChaosResult<()> {
        let pod_name = action.target_pod.as_str();
        info!(pod = pod_name, namespace = %action.namespace, "Removing injected ephemeral containers");

        if self.ctx.dry_run {
            info!(dry_run = true, "Would remove ephemeral containers from pod '{}'", pod_name);
            return Ok(());
        }

        let pod = self
            .ctx
            .client
            .get_pod(&action.namespace, pod_name)
            .await
            .map_err(|source| ChaosError::GetPod {
                name: pod_name.to_string(),
                source,
            })?;

        let (remove, keep): (Vec<EphemeralContainer>, Vec<EphemeralContainer>) =
            existing_ephemeral_containers(&pod)
                .into_iter()
                .partition(|c| is_injector_for(c, action, markers));

        if remove.is_empty() {
            info!(pod = pod_name, "No ephemeral containers found to remove");
            return Ok(());
        }

        self.ctx
            .client
            .patch_ephemeral_containers(&action.namespace, pod_name, &keep)
            .await
            .map_err(|source| ChaosError::PatchPod {
                name: pod_name.to_string(),
                source,
            })?;

        for container in &remove {
            info!(pod = pod_name, container = %container.name, "Removed ephemeral container");
        }
        Ok(())
    }

    /// Put a misrouted service's Endpoints back from its snapshot
    async fn restore_endpoints(&self, action: &ChaosAction) -> ChaosResult<()> {
        let service = action.target_pod.as_str();
        info!(service, namespace = %action.namespace, "Restoring endpoints");

        let backup_path = match action.meta(meta::BACKUP_PATH) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.ctx.backups.path_for(service, &action.namespace),
        };

        if self.ctx.dry_run {
            info!(
                dry_run = true,
                "Would restore endpoints for service '{}' from backup: {}",
                service,
                backup_path.display()
            );
            return Ok(());
        }

        let mut snapshot = self.ctx.backups.load(&backup_path)?;
        // The snapshot's version is stale by construction; replace unconditionally
        snapshot.metadata.resource_version = None;

        self.ctx
            .client
            .replace_endpoints(&action.namespace, &snapshot)
            .await
            .map_err(|source| ChaosError::UpdateEndpoints {
                name: service.to_string(),
                source,
            })?;

        if let Err(e) = self.ctx.backups.remove(&backup_path) {
            warn!("Failed to remove backup file: {}", e);
        }

        info!(service, "Successfully restored endpoints");
        Ok(())
    }
}

/// Exact match on the recorded action id when there is one, otherwise the
/// container-name markers
fn is_injector_for(container: &EphemeralContainer, action: &ChaosAction, markers: &[&str]) -> bool {
    match action.meta(meta::ACTION_ID) {
        Some(id) if !id.is_empty() => carries_action_id(container, id),
        _ => markers.iter().any(|m| container.name.contains(m)),
    }
}
