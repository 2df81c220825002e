use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tipsy::{
    chaos::{ChaosContext, InjectionReport, MisrouteTarget},
    cli::{Cli, Command},
    config::{format_duration, Config},
    k8s::K8sClient,
    rollback::{RollbackEngine, RollbackFilter},
    state::{ActionLedger, BackupStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration, then let flags win
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(path) = &cli.kubeconfig {
        config.kubeconfig = Some(path.clone());
    }
    config.namespace = config.resolve_namespace(cli.namespace.as_deref());
    config.dry_run |= cli.dry_run;
    config.verbose |= cli.verbose;

    // Initialize tracing
    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!(?config, "Configuration loaded");
    if config.dry_run {
        tracing::info!(dry_run = true, "Dry run enabled, no changes will be made");
    }

    let client = K8sClient::new(config.kubeconfig.as_deref())
        .await
        .context("failed to create Kubernetes client")?;
    let ledger = ActionLedger::new(config.ledger_path());
    let backups = BackupStore::new(config.rollback_dir());
    let ctx = ChaosContext::new(&client, &ledger, &backups, config.dry_run);
    let namespace = config.namespace.as_str();

    match cli.command {
        Command::Kill { selector, count } => {
            tracing::info!(namespace, selector = %selector, count, "Killing pods");
            match ctx.kill_pods(namespace, &selector, count).await {
                Ok(report) => {
                    tracing::info!("Pod kill completed: {} pod(s) deleted", report.deleted.len())
                }
                Err(e) => tracing::error!("Pod kill failed: {}", e),
            }
        }
        Command::Latency {
            selector,
            delay,
            duration,
            wait,
        } => {
            tracing::info!(
                namespace,
                selector = %selector,
                "Injecting {} latency for {}",
                delay,
                format_duration(duration)
            );
            let result = ctx
                .inject_latency(namespace, &selector, &delay, duration)
                .await;
            finish_injection("Latency injection", result, wait).await;
        }
        Command::Packetloss {
            selector,
            loss,
            duration,
            wait,
        } => {
            tracing::info!(
                namespace,
                selector = %selector,
                "Injecting {} packet loss for {}",
                loss,
                format_duration(duration)
            );
            let result = ctx
                .inject_packet_loss(namespace, &selector, &loss, duration)
                .await;
            finish_injection("Packet loss injection", result, wait).await;
        }
        Command::Cpustress {
            selector,
            method,
            duration,
            wait,
        } => {
            tracing::info!(
                namespace,
                selector = %selector,
                "Injecting CPU stress ({}) for {}",
                method,
                format_duration(duration)
            );
            let result = ctx
                .inject_cpu_stress(namespace, &selector, &method, duration)
                .await;
            finish_injection("CPU stress injection", result, wait).await;
        }
        Command::Misroute {
            service,
            remove_all,
            replace_with_selector,
        } => {
            let target = MisrouteTarget::from_flags(remove_all, replace_with_selector.as_deref())?;
            match ctx.misroute_service(&service, namespace, &target).await {
                Ok(_) => tracing::info!(service = %service, "Misroute completed"),
                Err(e) => tracing::error!(service = %service, "Misroute failed: {}", e),
            }
        }
        Command::Rollback { action_type, pod } => {
            let filter = RollbackFilter::new(action_type, pod);
            // A ledger that cannot be read aborts the command
            RollbackEngine::new(ctx)
                .rollback_all(&filter)
                .await
                .context("rollback failed")?;
        }
    }

    Ok(())
}

async fn finish_injection(
    operation: &str,
    result: tipsy::ChaosResult<InjectionReport>,
    wait: bool,
) {
    match result {
        Ok(report) => {
            tracing::info!(
                "{} completed: {} pod(s) affected",
                operation,
                report.affected_count()
            );
            if wait && !report.completions.is_empty() {
                tracing::info!("Waiting for injected faults to expire");
                report.wait().await;
            }
        }
        Err(e) => tracing::error!("{} failed: {}", operation, e),
    }
}
