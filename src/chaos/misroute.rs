//! Service misrouting by rewriting Endpoints

use k8s_openapi::api::core::v1::EndpointSubset;
use tracing::info;

use super::types::{ChaosType, MisrouteTarget};
use super::ChaosContext;
use crate::error::{ChaosError, ChaosResult};
use crate::k8s::find_pods;
use crate::k8s::resources::endpoint_subsets_from_pods;
use crate::state::{meta, ChaosAction};

impl ChaosContext<'_> {
    /// Rewrite the Endpoints of `service` per `target`.
    ///
    /// Outside dry run the current Endpoints are written to the backup store
    /// before anything changes, and the mutation is a single update that fails
    /// outright on a concurrent write. Returns the subsets that were (or would
    /// be) applied.
    pub async fn misroute_service(
        &self,
        service: &str,
        namespace: &str,
        target: &MisrouteTarget,
    ) -> ChaosResult<Vec<EndpointSubset>> {
        info!(service, namespace, "Starting misroute operation");

        let svc = self
            .client
            .get_service(namespace, service)
            .await
            .map_err(|source| ChaosError::GetService {
                name: service.to_string(),
                source,
            })?;
        let ports = svc
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.clone())
            .unwrap_or_default();
        info!(service, "Found service with {} port(s)", ports.len());

        let endpoints = self
            .client
            .get_endpoints(namespace, service)
            .await
            .map_err(|source| ChaosError::GetEndpoints {
                name: service.to_string(),
                source,
            })?;

        let backup_path = if self.dry_run {
            None
        } else {
            Some(self.backups.save(&endpoints, service, namespace)?)
        };

        let subsets = match target {
            MisrouteTarget::RemoveAll => {
                info!("Removing all endpoint subsets");
                Vec::new()
            }
            MisrouteTarget::ReplaceWithSelector(selector) => {
                info!(selector = %selector, "Replacing endpoints with matching pods");
                let pods = find_pods(self.client, namespace, selector).await?;
                endpoint_subsets_from_pods(&pods, &ports)
            }
        };

        if self.dry_run {
            info!(dry_run = true, "Would update endpoints for service '{}':", service);
            if subsets.is_empty() {
                info!(dry_run = true, "  - Remove all endpoint subsets (no traffic routing)");
            } else {
                info!(dry_run = true, "  - Replace with {} endpoint subset(s)", subsets.len());
                for (i, subset) in subsets.iter().enumerate() {
                    info!(
                        dry_run = true,
                        "    Subset {}: {} addresses, {} not ready, {} ports",
                        i + 1,
                        subset.addresses.as_ref().map_or(0, Vec::len),
                        subset.not_ready_addresses.as_ref().map_or(0, Vec::len),
                        subset.ports.as_ref().map_or(0, Vec::len)
                    );
                }
            }
            return Ok(subsets);
        }

        let mut modified = endpoints;
        modified.subsets = Some(subsets.clone());
        self.client
            .replace_endpoints(namespace, &modified)
            .await
            .map_err(|source| ChaosError::UpdateEndpoints {
                name: service.to_string(),
                source,
            })?;
        info!(service, "Successfully updated service endpoints");

        let (remove_all, replace_selector) = match target {
            MisrouteTarget::RemoveAll => (true, String::new()),
            MisrouteTarget::ReplaceWithSelector(sel) => (false, sel.clone()),
        };
        let mut action = ChaosAction::new(ChaosType::Misroute, service, namespace)
            .with_meta(meta::SERVICE, service)
            .with_meta(meta::REMOVE_ALL, remove_all.to_string())
            .with_meta(meta::REPLACE_WITH_SELECTOR, replace_selector);
        if let Some(path) = backup_path {
            action = action.with_meta(meta::BACKUP_PATH, path.display().to_string());
        }
        self.record(action);

        Ok(subsets)
    }
}
