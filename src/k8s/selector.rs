//! Pod selection by label selector

use k8s_openapi::api::core::v1::Pod;
use tracing::{info, warn};

use super::client::ClusterApi;
use super::resources::{is_pod_running, pod_name, pod_phase};
use crate::error::{ChaosError, ChaosResult};

/// List pods matching `selector`. An empty result is logged, not an error.
pub async fn find_pods(
    client: &dyn ClusterApi,
    namespace: &str,
    selector: &str,
) -> ChaosResult<Vec<Pod>> {
    info!(selector, namespace, "Searching for pods");

    let pods = client
        .list_pods(namespace, selector)
        .await
        .map_err(|source| ChaosError::ListPods {
            namespace: namespace.to_string(),
            selector: selector.to_string(),
            source,
        })?;

    if pods.is_empty() {
        warn!(selector, namespace, "No pods found matching selector");
    } else {
        info!("Found {} pod(s) matching selector", pods.len());
    }
    Ok(pods)
}

/// Keep only pods in the `Running` phase, warning about the rest
pub fn running_only(pods: Vec<Pod>) -> Vec<Pod> {
    pods.into_iter()
        .filter(|pod| {
            let running = is_pod_running(pod);
            if !running {
                warn!(
                    pod = pod_name(pod),
                    phase = pod_phase(pod),
                    "Skipping pod - not in Running state"
                );
            }
            running
        })
        .collect()
}
