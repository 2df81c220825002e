//! Kubernetes resource builders for chaos injection
//!
//! Ephemeral container specs, ephemeral-container patches and Endpoints
//! subsets are all built as typed k8s-openapi values and serialized with
//! serde, never assembled as strings.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    Capabilities, EndpointAddress, EndpointPort, EndpointSubset, EnvVar, EphemeralContainer,
    ObjectReference, Pod, ResourceRequirements, SecurityContext, ServicePort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde_json::json;

use crate::chaos::{NetemRule, StressMethod};

/// Image carrying `tc`, `nsenter` and `ps`
pub const NETEM_IMAGE: &str = "ghcr.io/chaos-tools/netem:latest";
pub const STRESS_NG_IMAGE: &str = "ghcr.io/chaos-tools/stress-ng:latest";
pub const YES_IMAGE: &str = "alpine";

/// Env var on every injected container tying it to its ledger entry
pub const ACTION_ID_ENV: &str = "TIPSY_ACTION_ID";

pub const LATENCY_PREFIX: &str = "latency-injector";
pub const PACKETLOSS_PREFIX: &str = "packetloss-injector";
pub const CPU_STRESS_PREFIX: &str = "tipsy-cpu-stress";
/// Shared marker for containers this tool created
pub const GENERIC_MARKER: &str = "tipsy-";

/// Process names probed, in order, when locating the workload's network namespace
pub const COMMON_PROCESSES: &[&str] = &[
    "nginx", "apache2", "httpd", "node", "python", "java", "go", "main",
];

/// `<prefix>-<unix seconds>`
pub fn container_name(prefix: &str, unix_time: i64) -> String {
    format!("{}-{}", prefix, unix_time)
}

/// Whole seconds for in-container timers, rounded up and never below one.
/// `stress-ng --timeout 0` means no timeout at all.
pub fn timer_seconds(duration: Duration) -> u64 {
    let secs = duration
        .as_secs()
        .saturating_add(u64::from(duration.subsec_nanos() > 0));
    secs.max(1)
}

/// Shell script run by a netem container: find the workload PID, add the
/// qdisc in its network namespace, hold it, then remove it (best effort)
pub fn netem_script(rule: &NetemRule, duration: Duration) -> String {
    let args = rule.netem_args();
    format!(
        r#"MAIN_PID=""
for proc in {processes}; do
  MAIN_PID=$(ps -o pid= -C "$proc" 2>/dev/null | head -1 | tr -d ' ')
  [ -n "$MAIN_PID" ] && break
done
[ -z "$MAIN_PID" ] && MAIN_PID=1
nsenter -t "$MAIN_PID" -n tc qdisc add dev eth0 root netem {args}
sleep {secs}
nsenter -t "$MAIN_PID" -n tc qdisc del dev eth0 root netem {args} 2>/dev/null || true
"#,
        processes = COMMON_PROCESSES.join(" "),
        args = args,
        secs = timer_seconds(duration),
    )
}

fn action_id_env(action_id: &str) -> Vec<EnvVar> {
    vec![EnvVar {
        name: ACTION_ID_ENV.to_string(),
        value: Some(action_id.to_string()),
        ..Default::default()
    }]
}

/// Privileged netem container for latency or packet loss
pub fn netem_container(
    name: &str,
    rule: &NetemRule,
    duration: Duration,
    action_id: &str,
) -> EphemeralContainer {
    EphemeralContainer {
        name: name.to_string(),
        image: Some(NETEM_IMAGE.to_string()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            netem_script(rule, duration),
        ]),
        env: Some(action_id_env(action_id)),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            capabilities: Some(Capabilities {
                add: Some(vec!["NET_ADMIN".to_string(), "SYS_PTRACE".to_string()]),
                drop: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Image and command for a CPU stress method
pub fn cpu_stress_command(method: StressMethod, duration: Duration) -> (&'static str, Vec<String>) {
    let secs = timer_seconds(duration);
    match method {
        StressMethod::StressNg => (
            STRESS_NG_IMAGE,
            vec![
                "stress-ng".to_string(),
                "--cpu".to_string(),
                "1".to_string(),
                "--timeout".to_string(),
                format!("{}s", secs),
            ],
        ),
        StressMethod::Yes => (
            YES_IMAGE,
            vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("yes > /dev/null & sleep {}", secs),
            ],
        ),
    }
}

/// CPU stress container with bounded requests and limits
pub fn cpu_stress_container(
    name: &str,
    method: StressMethod,
    duration: Duration,
    action_id: &str,
) -> EphemeralContainer {
    let (image, command) = cpu_stress_command(method, duration);
    EphemeralContainer {
        name: name.to_string(),
        image: Some(image.to_string()),
        command: Some(command),
        env: Some(action_id_env(action_id)),
        resources: Some(cpu_stress_resources()),
        ..Default::default()
    }
}

fn cpu_stress_resources() -> ResourceRequirements {
    let quantities = |cpu: &str, memory: &str| -> BTreeMap<String, Quantity> {
        [
            ("cpu".to_string(), Quantity(cpu.to_string())),
            ("memory".to_string(), Quantity(memory.to_string())),
        ]
        .into_iter()
        .collect()
    };

    ResourceRequirements {
        requests: Some(quantities("100m", "64Mi")),
        limits: Some(quantities("500m", "128Mi")),
        ..Default::default()
    }
}

/// Body for a strategic-merge patch of `spec.ephemeralContainers`
pub fn ephemeral_containers_patch(containers: &[EphemeralContainer]) -> serde_json::Value {
    json!({
        "spec": {
            "ephemeralContainers": containers
        }
    })
}

/// Current ephemeral containers of a pod, empty if none
pub fn existing_ephemeral_containers(pod: &Pod) -> Vec<EphemeralContainer> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.ephemeral_containers.clone())
        .unwrap_or_default()
}

/// True when the container was tagged with exactly this action id
pub fn carries_action_id(container: &EphemeralContainer, action_id: &str) -> bool {
    container
        .env
        .iter()
        .flatten()
        .any(|env| env.name == ACTION_ID_ENV && env.value.as_deref() == Some(action_id))
}

pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

pub fn pod_phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown")
}

pub fn is_pod_running(pod: &Pod) -> bool {
    pod_phase(pod) == "Running"
}

/// True when the pod reports condition `Ready=True`
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Endpoint ports mirroring every port of the Service
pub fn endpoint_ports(service_ports: &[ServicePort]) -> Vec<EndpointPort> {
    service_ports
        .iter()
        .map(|port| EndpointPort {
            name: port.name.clone(),
            port: port.port,
            protocol: port.protocol.clone(),
            ..Default::default()
        })
        .collect()
}

fn endpoint_address(pod: &Pod, ip: &str) -> EndpointAddress {
    EndpointAddress {
        ip: ip.to_string(),
        target_ref: Some(ObjectReference {
            kind: Some("Pod".to_string()),
            namespace: pod.metadata.namespace.clone(),
            name: pod.metadata.name.clone(),
            uid: pod.metadata.uid.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build Endpoints subsets from pods: one subset for ready addresses and
/// one for not-ready addresses, each carrying all service ports. Empty
/// partitions are omitted, so no usable pods means no subsets. Pods without
/// an IP cannot be addressed and are left out.
pub fn endpoint_subsets_from_pods(pods: &[Pod], service_ports: &[ServicePort]) -> Vec<EndpointSubset> {
    if service_ports.is_empty() {
        return Vec::new();
    }

    let mut ready = Vec::new();
    let mut not_ready = Vec::new();
    for pod in pods {
        let Some(ip) = pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.as_deref())
            .filter(|ip| !ip.is_empty())
        else {
            continue;
        };

        let address = endpoint_address(pod, ip);
        if is_pod_ready(pod) {
            ready.push(address);
        } else {
            not_ready.push(address);
        }
    }

    let ports = endpoint_ports(service_ports);
    let mut subsets = Vec::new();
    if !ready.is_empty() {
        subsets.push(EndpointSubset {
            addresses: Some(ready),
            ports: Some(ports.clone()),
            ..Default::default()
        });
    }
    if !not_ready.is_empty() {
        subsets.push(EndpointSubset {
            not_ready_addresses: Some(not_ready),
            ports: Some(ports),
            ..Default::default()
        });
    }
    subsets
}
