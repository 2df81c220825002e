//! Kubernetes client surface used by the chaos operations

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EphemeralContainer, Endpoints, Pod, Service};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use tracing::{debug, info, instrument};

#[cfg(test)]
use mockall::automock;

use super::resources::ephemeral_containers_patch;
use crate::error::{ChaosError, ChaosResult};

/// The slice of the Kubernetes API the chaos operations need.
///
/// Everything is addressed by namespace and name. Calls are single round
/// trips with no retry; callers decide whether a failure aborts or is skipped.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List pods matching a label selector
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, kube::Error>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, kube::Error>;

    /// Strategic-merge `spec.ephemeralContainers` on the pod's
    /// `ephemeralcontainers` subresource with the given full list
    async fn patch_ephemeral_containers(
        &self,
        namespace: &str,
        name: &str,
        containers: &[EphemeralContainer],
    ) -> Result<Pod, kube::Error>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, kube::Error>;

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, kube::Error>;

    /// Unconditional replace of an Endpoints object
    async fn replace_endpoints(
        &self,
        namespace: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, kube::Error>;
}

/// Wrapper around kube::Client implementing [`ClusterApi`]
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Connect using an explicit kubeconfig path, or infer the configuration
    /// (in-cluster service account, then `~/.kube/config`)
    #[instrument(skip_all)]
    pub async fn new(kubeconfig: Option<&str>) -> ChaosResult<Self> {
        let config = match kubeconfig.filter(|p| !p.is_empty()) {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ChaosError::Client(format!("failed to read kubeconfig {}: {}", path, e))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        ChaosError::Client(format!("failed to build config from {}: {}", path, e))
                    })?
            }
            None => Config::infer()
                .await
                .map_err(|e| ChaosError::Client(e.to_string()))?,
        };

        let client = Client::try_from(config).map_err(|e| ChaosError::Client(e.to_string()))?;
        debug!("Kubernetes client ready");

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the inner kube Client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for K8sClient {
    #[instrument(skip(self))]
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, kube::Error> {
        let list = self
            .pods(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(list.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, kube::Error> {
        self.pods(namespace).get(name).await
    }

    #[instrument(skip(self, containers), fields(count = containers.len()))]
    async fn patch_ephemeral_containers(
        &self,
        namespace: &str,
        name: &str,
        containers: &[EphemeralContainer],
    ) -> Result<Pod, kube::Error> {
        let patch = ephemeral_containers_patch(containers);
        let pod = self
            .pods(namespace)
            .patch_subresource(
                "ephemeralcontainers",
                name,
                &PatchParams::default(),
                &Patch::Strategic(&patch),
            )
            .await?;
        info!("Patched ephemeral containers");
        Ok(pod)
    }

    #[instrument(skip(self))]
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, kube::Error> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        services.get(name).await
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, kube::Error> {
        let endpoints: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        endpoints.get(name).await
    }

    #[instrument(skip(self, endpoints), fields(name = %endpoints.metadata.name.as_deref().unwrap_or("unknown")))]
    async fn replace_endpoints(
        &self,
        namespace: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, kube::Error> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let name = endpoints.metadata.name.clone().unwrap_or_default();
        api.replace(&name, &PostParams::default(), endpoints).await
    }
}
