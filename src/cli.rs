use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::parse_duration;

#[derive(Parser, Debug)]
#[command(name = "tipsy")]
#[command(version)]
#[command(about = "Chaos engineering for Kubernetes: kill pods, inject faults, misroute services, roll it all back")]
pub struct Cli {
    /// Path to the kubeconfig file (defaults to in-cluster, then ~/.kube/config)
    #[arg(long, global = true)]
    pub kubeconfig: Option<String>,

    /// Kubernetes namespace
    #[arg(long, short = 'n', global = true)]
    pub namespace: Option<String>,

    /// Log what would happen without changing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Delete random pods matching a label selector
    Kill {
        /// Label selector, e.g. app=web
        #[arg(long, short)]
        selector: String,

        /// Number of pods to delete
        #[arg(long, short, default_value_t = 1, allow_negative_numbers = true)]
        count: i64,
    },

    /// Add network latency to running pods
    Latency {
        #[arg(long, short)]
        selector: String,

        /// Delay to add, e.g. 200ms
        #[arg(long, default_value = "200ms")]
        delay: String,

        #[arg(long, default_value = "30s", value_parser = duration_arg)]
        duration: Duration,

        /// Block until every injected fault has expired
        #[arg(long)]
        wait: bool,
    },

    /// Drop a share of packets on running pods
    Packetloss {
        #[arg(long, short)]
        selector: String,

        /// Loss percentage, e.g. 30%
        #[arg(long, default_value = "30%")]
        loss: String,

        #[arg(long, default_value = "30s", value_parser = duration_arg)]
        duration: Duration,

        #[arg(long)]
        wait: bool,
    },

    /// Burn CPU inside running pods
    Cpustress {
        #[arg(long, short)]
        selector: String,

        /// stress-ng or yes
        #[arg(long, default_value = "stress-ng")]
        method: String,

        #[arg(long, default_value = "60s", value_parser = duration_arg)]
        duration: Duration,

        #[arg(long)]
        wait: bool,
    },

    /// Rewrite a service's endpoints
    Misroute {
        /// Service name
        #[arg(long)]
        service: String,

        /// Remove every endpoint so the service routes nowhere
        #[arg(long)]
        remove_all: bool,

        /// Point the service at pods matching this selector instead
        #[arg(long)]
        replace_with_selector: Option<String>,
    },

    /// Undo recorded chaos actions
    Rollback {
        /// Only roll back actions of this type
        #[arg(long = "type")]
        action_type: Option<String>,

        /// Only roll back actions targeting this pod or service
        #[arg(long)]
        pod: Option<String>,
    },
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}
