use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ChaosError, ChaosResult};

/// Directory under the user's home holding the ledger and endpoint backups
pub const TIPSY_DIR: &str = ".tipsy";

const STATE_FILE_NAME: &str = "state.json";
const ROLLBACK_DIR_NAME: &str = "rollback";

/// Effective configuration for one invocation.
///
/// Built once in `main` from the environment and CLI flags, then handed to
/// whatever needs it. Nothing reads configuration from a global.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub kubeconfig: Option<String>,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub verbose: bool,

    /// Ledger file override (`TIPSY_STATE_FILE`)
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    #[serde(default)]
    pub rollback_dir: Option<PathBuf>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Config {
    /// Load from `TIPSY_*` environment variables, after reading `.env` if present
    pub fn load() -> ChaosResult<Self> {
        dotenvy::dotenv().ok();

        let settings = ::config::Config::builder()
            .add_source(::config::Environment::with_prefix("TIPSY").try_parsing(true))
            .build()
            .map_err(|e| ChaosError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| ChaosError::Config(e.to_string()))
    }

    /// Resolve the ledger path: explicit override, else `~/.tipsy/state.json`
    pub fn ledger_path(&self) -> PathBuf {
        match &self.state_file {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => tipsy_home().join(STATE_FILE_NAME),
        }
    }

    /// Resolve the endpoint backup directory, `~/.tipsy/rollback` by default
    pub fn rollback_dir(&self) -> PathBuf {
        match &self.rollback_dir {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => tipsy_home().join(ROLLBACK_DIR_NAME),
        }
    }

    /// A subcommand's own `--namespace` wins over the global one
    pub fn resolve_namespace(&self, local: Option<&str>) -> String {
        match local {
            Some(ns) if !ns.is_empty() => ns.to_string(),
            _ if !self.namespace.is_empty() => self.namespace.clone(),
            _ => default_namespace(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            namespace: default_namespace(),
            dry_run: false,
            verbose: false,
            state_file: None,
            rollback_dir: None,
        }
    }
}

/// `~/.tipsy`, or `./.tipsy` when no home directory is available
fn tipsy_home() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(TIPSY_DIR),
        None => PathBuf::from(TIPSY_DIR),
    }
}

/// Parse a Go-style duration such as `200ms`, `30s`, `1m30s` or `1h`.
///
/// Every number needs a unit; a bare `0` is accepted.
pub fn parse_duration(input: &str) -> ChaosResult<Duration> {
    let invalid = || ChaosError::InvalidDuration(input.to_string());
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let seconds = match unit {
            "ns" => value / 1e9,
            "us" | "µs" => value / 1e6,
            "ms" => value / 1e3,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return Err(invalid()),
        };
        let part = Duration::try_from_secs_f64(seconds).map_err(|_| invalid())?;
        total = total.checked_add(part).ok_or_else(invalid)?;
    }

    Ok(total)
}

/// Render a duration the way users typed it, e.g. `1m30s` or `200ms`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let mut secs = duration.as_secs();
    let mut out = String::new();
    for (unit, size) in [("h", 3600), ("m", 60)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    if secs > 0 || out.is_empty() {
        out.push_str(&format!("{}s", secs));
    }
    out
}
