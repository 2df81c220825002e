//! Fault injection through ephemeral containers
//!
//! One container is attached per eligible (Running) pod. The container
//! removes its own netem rule when its sleep ends; the completion timer
//! spawned here only reports that the duration has elapsed.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::{EphemeralContainer, Pod};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use super::types::{ChaosType, InjectionReport, NetemRule, StressMethod};
use super::ChaosContext;
use crate::config::format_duration;
use crate::error::{ChaosError, ChaosResult};
use crate::k8s::resources::{
    container_name, cpu_stress_command, cpu_stress_container, existing_ephemeral_containers,
    netem_container, pod_name, CPU_STRESS_PREFIX, LATENCY_PREFIX, NETEM_IMAGE, PACKETLOSS_PREFIX,
};
use crate::k8s::{find_pods, running_only};
use crate::state::{meta, ChaosAction};

enum Fault {
    Netem(NetemRule),
    CpuStress(StressMethod),
}

impl Fault {
    fn chaos_type(&self) -> ChaosType {
        match self {
            Fault::Netem(rule) => rule.chaos_type(),
            Fault::CpuStress(_) => ChaosType::CpuStress,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Fault::Netem(NetemRule::Delay(_)) => "latency",
            Fault::Netem(NetemRule::Loss(_)) => "packet loss",
            Fault::CpuStress(_) => "CPU stress",
        }
    }

    fn name_prefix(&self) -> &'static str {
        match self {
            Fault::Netem(NetemRule::Delay(_)) => LATENCY_PREFIX,
            Fault::Netem(NetemRule::Loss(_)) => PACKETLOSS_PREFIX,
            Fault::CpuStress(_) => CPU_STRESS_PREFIX,
        }
    }

    fn container(&self, name: &str, duration: Duration, action_id: &str) -> EphemeralContainer {
        match self {
            Fault::Netem(rule) => netem_container(name, rule, duration, action_id),
            Fault::CpuStress(method) => cpu_stress_container(name, *method, duration, action_id),
        }
    }

    /// Image and human-readable command for dry-run output
    fn describe(&self, duration: Duration) -> (String, String) {
        match self {
            Fault::Netem(rule) => (
                NETEM_IMAGE.to_string(),
                format!("nsenter -t <pid> -n tc qdisc add dev eth0 root netem {}", rule),
            ),
            Fault::CpuStress(method) => {
                let (image, command) = cpu_stress_command(*method, duration);
                (image.to_string(), command.join(" "))
            }
        }
    }

    fn annotate(&self, action: ChaosAction) -> ChaosAction {
        match self {
            Fault::Netem(NetemRule::Delay(delay)) => action.with_meta(meta::DELAY, delay.as_str()),
            Fault::Netem(NetemRule::Loss(loss)) => action.with_meta(meta::LOSS, loss.as_str()),
            Fault::CpuStress(method) => action.with_meta(meta::METHOD, method.as_ref()),
        }
    }
}

impl ChaosContext<'_> {
    /// Add `delay` of network latency to every Running pod matching `selector`
    pub async fn inject_latency(
        &self,
        namespace: &str,
        selector: &str,
        delay: &str,
        duration: Duration,
    ) -> ChaosResult<InjectionReport> {
        let fault = Fault::Netem(NetemRule::delay(delay)?);
        self.inject(namespace, selector, fault, duration).await
    }

    /// Drop `loss` (e.g. `10%`) of packets on every Running pod matching `selector`
    pub async fn inject_packet_loss(
        &self,
        namespace: &str,
        selector: &str,
        loss: &str,
        duration: Duration,
    ) -> ChaosResult<InjectionReport> {
        let fault = Fault::Netem(NetemRule::loss(loss)?);
        self.inject(namespace, selector, fault, duration).await
    }

    /// Burn CPU in every Running pod matching `selector`.
    /// `method` must be exactly `stress-ng` or `yes`.
    pub async fn inject_cpu_stress(
        &self,
        namespace: &str,
        selector: &str,
        method: &str,
        duration: Duration,
    ) -> ChaosResult<InjectionReport> {
        let method = StressMethod::parse(method)?;
        self.inject(namespace, selector, Fault::CpuStress(method), duration)
            .await
    }

    async fn inject(
        &self,
        namespace: &str,
        selector: &str,
        fault: Fault,
        duration: Duration,
    ) -> ChaosResult<InjectionReport> {
        expiry_after(Utc::now(), duration)?;
        let pods = running_only(find_pods(self.client, namespace, selector).await?);
        let mut report = InjectionReport::default();

        for pod in &pods {
            let name = pod_name(pod);
            info!(
                pod = name,
                duration = %format_duration(duration),
                "Injecting {} ({})",
                fault.label(),
                fault.chaos_type()
            );

            if self.dry_run {
                let (image, command) = fault.describe(duration);
                info!(dry_run = true, "Would inject {} to pod '{}':", fault.label(), name);
                info!(dry_run = true, "  - Add ephemeral container with image: {}", image);
                info!(dry_run = true, "  - Command: {}", command);
                info!(dry_run = true, "  - Duration: {}", format_duration(duration));
                continue;
            }

            match self
                .inject_into_pod(pod, namespace, selector, &fault, duration)
                .await
            {
                Ok(handle) => {
                    report.affected.push(name.to_string());
                    report.completions.push(handle);
                }
                Err(e) => {
                    error!(pod = name, "Failed to inject {}: {}", fault.label(), e);
                }
            }
        }

        Ok(report)
    }

    async fn inject_into_pod(
        &self,
        pod: &Pod,
        namespace: &str,
        selector: &str,
        fault: &Fault,
        duration: Duration,
    ) -> ChaosResult<JoinHandle<()>> {
        let name = pod_name(pod);
        let action_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = expiry_after(now, duration)?;
        let container = container_name(fault.name_prefix(), now.timestamp());

        // The subresource patch carries the whole list: existing plus ours
        let mut containers = existing_ephemeral_containers(pod);
        containers.push(fault.container(&container, duration, &action_id));

        self.client
            .patch_ephemeral_containers(namespace, name, &containers)
            .await
            .map_err(|source| ChaosError::PatchPod {
                name: name.to_string(),
                source,
            })?;
        info!(pod = name, container = %container, "Successfully added ephemeral container");

        let action = ChaosAction::new(fault.chaos_type(), name, namespace)
            .with_meta(meta::SELECTOR, selector)
            .with_meta(meta::DURATION, format_duration(duration))
            .with_meta(meta::CONTAINER, container.as_str())
            .with_meta(meta::ACTION_ID, action_id)
            .with_meta(
                meta::EXPIRES_AT,
                expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        self.record(fault.annotate(action));

        Ok(spawn_completion_timer(fault.label(), name, duration))
    }
}

/// When a fault started at `start` runs out; durations past chrono's range are rejected
fn expiry_after(start: DateTime<Utc>, duration: Duration) -> ChaosResult<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
        .ok_or_else(|| ChaosError::InvalidDuration(format_duration(duration)))
}

/// Sleep for `duration`, then log that the fault on `pod` has run its course.
/// Nothing is cleaned up here; the returned handle lets callers wait for it.
pub fn spawn_completion_timer(label: &'static str, pod: &str, duration: Duration) -> JoinHandle<()> {
    let pod = pod.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        info!(pod = %pod, "{} injection completed", label);
    })
}
