//! In-memory cluster for scenario tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointSubset, Endpoints, EphemeralContainer, Pod, PodSpec, PodStatus,
    Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::error::ErrorResponse;

use tipsy::k8s::ClusterApi;
use tipsy::state::{ActionLedger, BackupStore};

/// A mutating call observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Patch { pod: String, containers: Vec<String> },
    Delete { pod: String },
    ReplaceEndpoints { name: String, subsets: usize, backup_present: bool },
}

#[derive(Default)]
struct State {
    pods: HashMap<(String, String), Pod>,
    services: HashMap<(String, String), Service>,
    endpoints: HashMap<(String, String), Endpoints>,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    /// Checked for existence whenever Endpoints are replaced
    pub backup_probe: Mutex<Option<PathBuf>>,
    /// Deleted from disk during the next Endpoints replace
    pub remove_on_replace: Mutex<Option<PathBuf>>,
}

fn not_found(kind: &str, name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} \"{}\" not found", kind, name),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

/// Equality-based selectors only, e.g. `app=web,tier=front`
fn selector_matches(selector: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.and_then(|l| l.get(k)).map(String::as_str) == Some(v),
            None => false,
        })
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pod(&self, pod: Pod) {
        let ns = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.state.lock().unwrap().pods.insert((ns, name), pod);
    }

    pub fn add_service(&self, service: Service, endpoints: Endpoints) {
        let ns = service.metadata.namespace.clone().unwrap_or_default();
        let name = service.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        state.services.insert((ns.clone(), name.clone()), service);
        state.endpoints.insert((ns, name), endpoints);
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state.lock().unwrap().pods.get(&key(namespace, name)).cloned()
    }

    pub fn pod_count(&self) -> usize {
        self.state.lock().unwrap().pods.len()
    }

    pub fn endpoints(&self, namespace: &str, name: &str) -> Option<Endpoints> {
        self.state.lock().unwrap().endpoints.get(&key(namespace, name)).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, kube::Error> {
        let state = self.state.lock().unwrap();
        let mut pods: Vec<Pod> = state
            .pods
            .iter()
            .filter(|((ns, _), pod)| {
                ns == namespace && selector_matches(selector, pod.metadata.labels.as_ref())
            })
            .map(|(_, pod)| pod.clone())
            .collect();
        pods.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(pods)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, kube::Error> {
        self.pod(namespace, name).ok_or_else(|| not_found("pods", name))
    }

    async fn patch_ephemeral_containers(
        &self,
        namespace: &str,
        name: &str,
        containers: &[EphemeralContainer],
    ) -> Result<Pod, kube::Error> {
        let mut state = self.state.lock().unwrap();
        let pod = state
            .pods
            .get_mut(&key(namespace, name))
            .ok_or_else(|| not_found("pods", name))?;
        pod.spec.get_or_insert_with(Default::default).ephemeral_containers =
            Some(containers.to_vec());
        let patched = pod.clone();
        state.calls.push(Call::Patch {
            pod: name.to_string(),
            containers: containers.iter().map(|c| c.name.clone()).collect(),
        });
        Ok(patched)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        let mut state = self.state.lock().unwrap();
        state
            .pods
            .remove(&key(namespace, name))
            .ok_or_else(|| not_found("pods", name))?;
        state.calls.push(Call::Delete {
            pod: name.to_string(),
        });
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, kube::Error> {
        let state = self.state.lock().unwrap();
        state
            .services
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found("services", name))
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, kube::Error> {
        self.endpoints(namespace, name)
            .ok_or_else(|| not_found("endpoints", name))
    }

    async fn replace_endpoints(
        &self,
        namespace: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, kube::Error> {
        let backup_present = self
            .backup_probe
            .lock()
            .unwrap()
            .as_ref()
            .map_or(false, |path| path.exists());
        if let Some(path) = self.remove_on_replace.lock().unwrap().take() {
            std::fs::remove_file(path).unwrap();
        }
        let name = endpoints.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ReplaceEndpoints {
            name: name.clone(),
            subsets: endpoints.subsets.as_ref().map_or(0, Vec::len),
            backup_present,
        });
        state.endpoints.insert(key(namespace, &name), endpoints.clone());
        Ok(endpoints.clone())
    }
}

/// Ledger and backup store rooted in a temp dir
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub ledger: ActionLedger,
    pub backups: BackupStore,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ActionLedger::new(dir.path().join("state.json"));
        let backups = BackupStore::new(dir.path().join("rollback"));
        Self {
            dir,
            ledger,
            backups,
        }
    }
}

pub fn pod(namespace: &str, name: &str, app: &str, phase: &str, ip: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
            ..Default::default()
        },
        spec: Some(PodSpec::default()),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            pod_ip: Some(ip.to_string()),
            ..Default::default()
        }),
    }
}

pub fn pod_with_containers(pod: Pod, containers: Vec<EphemeralContainer>) -> Pod {
    let mut pod = pod;
    pod.spec.get_or_insert_with(Default::default).ephemeral_containers = Some(containers);
    pod
}

pub fn service(namespace: &str, name: &str, address: &str) -> (Service, Endpoints) {
    let metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        resource_version: Some("100".to_string()),
        ..Default::default()
    };
    let service = Service {
        metadata: metadata.clone(),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: 80,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let endpoints = Endpoints {
        metadata,
        subsets: Some(vec![EndpointSubset {
            addresses: Some(vec![EndpointAddress {
                ip: address.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    };
    (service, endpoints)
}
