use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::chaos::ChaosType;
use crate::error::{ChaosError, ChaosResult};

/// Well-known metadata keys
pub mod meta {
    pub const ACTION_ID: &str = "actionId";
    pub const BACKUP_PATH: &str = "backupPath";
    pub const CONTAINER: &str = "container";
    pub const COUNT: &str = "count";
    pub const DELAY: &str = "delay";
    pub const DURATION: &str = "duration";
    pub const EXPIRES_AT: &str = "expiresAt";
    pub const LOSS: &str = "loss";
    pub const METHOD: &str = "method";
    pub const REMOVE_ALL: &str = "remove_all";
    pub const REPLACE_WITH_SELECTOR: &str = "replace_with_selector";
    pub const SELECTOR: &str = "selector";
    pub const SERVICE: &str = "service";
}

/// A single performed chaos action as stored in the ledger.
///
/// `action_type` stays a plain string so entries written by other versions
/// (or edited by hand) survive a load/rewrite cycle untouched; it is parsed
/// into a [`ChaosType`] only when the action is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaosAction {
    #[serde(rename = "type")]
    pub action_type: String,
    /// Pod name, or service name for misroute
    pub target_pod: String,
    pub namespace: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: BTreeMap<String, String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChaosAction {
    pub fn new(kind: ChaosType, target: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            action_type: kind.to_string(),
            target_pod: target.into(),
            namespace: namespace.into(),
            timestamp: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn kind(&self) -> ChaosResult<ChaosType> {
        self.action_type
            .parse()
            .map_err(|_| ChaosError::UnknownActionType(self.action_type.clone()))
    }

    pub(crate) fn stamp_if_missing(&mut self) {
        if self.timestamp.is_empty() {
            self.timestamp = now_rfc3339();
        }
    }
}

/// Current time as RFC3339 UTC with second precision, e.g. `2024-05-01T10:00:00Z`
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
