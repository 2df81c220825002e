//! Pod kill

use std::collections::HashSet;

use rand::Rng;
use tracing::{error, info, warn};

use super::types::{ChaosType, KillReport};
use super::ChaosContext;
use crate::error::ChaosResult;
use crate::k8s::find_pods;
use crate::k8s::resources::pod_name;
use crate::state::{meta, ChaosAction};

/// Pick `count` distinct indices in `0..len` uniformly at random.
/// `count` is clamped to `[0, len]`.
pub fn select_distinct_indices<R: Rng + ?Sized>(len: usize, count: i64, rng: &mut R) -> Vec<usize> {
    let count = count.clamp(0, len as i64) as usize;
    let mut used = HashSet::with_capacity(count);
    let mut selected = Vec::with_capacity(count);

    while selected.len() < count {
        let index = rng.gen_range(0..len);
        if used.insert(index) {
            selected.push(index);
        }
    }
    selected
}

impl ChaosContext<'_> {
    /// Delete up to `count` random pods matching `selector`, regardless of phase
    pub async fn kill_pods(
        &self,
        namespace: &str,
        selector: &str,
        count: i64,
    ) -> ChaosResult<KillReport> {
        let pods = find_pods(self.client, namespace, selector).await?;
        if pods.is_empty() {
            return Ok(KillReport::default());
        }

        if count <= 0 {
            warn!("Invalid count {}, no pods will be deleted", count);
        } else if (pods.len() as i64) < count {
            warn!(
                "Only {} pods available, limiting kill count to {}",
                pods.len(),
                pods.len()
            );
        }

        let indices = select_distinct_indices(pods.len(), count, &mut rand::thread_rng());
        let selected: Vec<String> = indices
            .into_iter()
            .map(|i| pod_name(&pods[i]).to_string())
            .collect();

        let mut report = KillReport {
            selected: selected.clone(),
            deleted: Vec::new(),
        };

        if self.dry_run {
            info!(dry_run = true, "Would delete {} pod(s):", selected.len());
            for name in &selected {
                info!(dry_run = true, "  - {}", name);
            }
            return Ok(report);
        }

        info!("Deleting {} pod(s)", selected.len());
        for name in selected {
            match self.client.delete_pod(namespace, &name).await {
                Ok(()) => {
                    info!(pod = %name, "Successfully deleted pod");
                    self.record(
                        ChaosAction::new(ChaosType::Kill, name.as_str(), namespace)
                            .with_meta(meta::SELECTOR, selector)
                            .with_meta(meta::COUNT, count.to_string()),
                    );
                    report.deleted.push(name);
                }
                Err(e) => {
                    error!(pod = %name, "Failed to delete pod: {}", e);
                }
            }
        }

        Ok(report)
    }
}
