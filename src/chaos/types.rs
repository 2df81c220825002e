//! Chaos action kinds, fault parameters and operation reports

use std::fmt;

use futures::future::join_all;
use strum::{AsRefStr, Display, EnumString};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{ChaosError, ChaosResult};

/// Kinds of chaos this tool can perform and roll back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ChaosType {
    /// Pod deletion
    Kill,
    /// netem delay
    Latency,
    /// netem loss
    #[strum(serialize = "packetloss")]
    PacketLoss,
    /// CPU burn inside an ephemeral container
    #[strum(serialize = "cpustress")]
    CpuStress,
    /// Service Endpoints rewrite
    Misroute,
}

/// A netem rule applied inside the pod's network namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetemRule {
    /// e.g. `200ms`
    Delay(String),
    /// e.g. `10%`
    Loss(String),
}

impl NetemRule {
    /// Validated delay such as `200ms`, `1.5s` or `100us`
    pub fn delay(value: &str) -> ChaosResult<Self> {
        let (number, unit) = split_number(value);
        if is_decimal(number) && matches!(unit, "us" | "ms" | "s") {
            Ok(NetemRule::Delay(value.to_string()))
        } else {
            Err(ChaosError::InvalidNetemValue(value.to_string()))
        }
    }

    /// Validated loss percentage such as `30%` or `0.5%`
    pub fn loss(value: &str) -> ChaosResult<Self> {
        let (number, unit) = split_number(value);
        if is_decimal(number) && unit == "%" {
            Ok(NetemRule::Loss(value.to_string()))
        } else {
            Err(ChaosError::InvalidNetemValue(value.to_string()))
        }
    }

    /// Arguments following `netem` on the tc command line
    pub fn netem_args(&self) -> String {
        match self {
            NetemRule::Delay(delay) => format!("delay {}", delay),
            NetemRule::Loss(loss) => format!("loss {}", loss),
        }
    }

    pub fn chaos_type(&self) -> ChaosType {
        match self {
            NetemRule::Delay(_) => ChaosType::Latency,
            NetemRule::Loss(_) => ChaosType::PacketLoss,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            NetemRule::Delay(v) | NetemRule::Loss(v) => v,
        }
    }
}

fn split_number(value: &str) -> (&str, &str) {
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    value.split_at(end)
}

/// `12` or `1.5`; no sign, no exponent, at most one dot
fn is_decimal(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next();
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

impl fmt::Display for NetemRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.netem_args())
    }
}

/// How CPU load is generated. Parsing is case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum StressMethod {
    #[strum(serialize = "stress-ng")]
    StressNg,
    #[strum(serialize = "yes")]
    Yes,
}

impl StressMethod {
    pub fn parse(method: &str) -> ChaosResult<Self> {
        method
            .parse()
            .map_err(|_| ChaosError::InvalidMethod(method.to_string()))
    }
}

/// How a misroute rewrites a Service's Endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MisrouteTarget {
    /// Leave the service with no endpoints
    RemoveAll,
    /// Point the service at pods matching this selector
    ReplaceWithSelector(String),
}

impl MisrouteTarget {
    /// Build from the two mutually exclusive CLI options
    pub fn from_flags(remove_all: bool, replace_selector: Option<&str>) -> ChaosResult<Self> {
        let selector = replace_selector.filter(|s| !s.is_empty());
        match (remove_all, selector) {
            (true, None) => Ok(MisrouteTarget::RemoveAll),
            (false, Some(sel)) => Ok(MisrouteTarget::ReplaceWithSelector(sel.to_string())),
            (true, Some(_)) => Err(ChaosError::Config(
                "--remove-all and --replace-with-selector cannot be used together".to_string(),
            )),
            (false, None) => Err(ChaosError::Config(
                "either --remove-all or --replace-with-selector must be specified".to_string(),
            )),
        }
    }
}

/// Outcome of a fault injection.
///
/// `completions` holds one timer per affected pod that finishes when the
/// fault's duration has elapsed. Dropping the report detaches them.
#[derive(Debug, Default)]
pub struct InjectionReport {
    pub affected: Vec<String>,
    pub completions: Vec<JoinHandle<()>>,
}

impl InjectionReport {
    pub fn affected_count(&self) -> usize {
        self.affected.len()
    }

    /// Wait until every injected fault has run its course
    pub async fn wait(self) {
        for result in join_all(self.completions).await {
            if let Err(e) = result {
                warn!("Completion timer failed: {}", e);
            }
        }
    }
}

/// Outcome of a pod kill
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KillReport {
    /// Pods chosen for deletion
    pub selected: Vec<String>,
    /// Pods actually deleted (empty in dry run)
    pub deleted: Vec<String>,
}
