use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::WindowId;

/// One of the fixed browsing identities windows lease.
///
/// Serialized in the persisted layout `{id, proxy, window, session, inUse}`.
/// Older records wrote `""` for "no proxy" and "no window"; both read back as
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: usize,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub proxy: Option<String>,
    #[serde(default, deserialize_with = "window_or_none")]
    pub window: Option<WindowId>,
    pub session: String,
    #[serde(default)]
    pub in_use: HashMap<String, bool>,
}

impl SessionRecord {
    pub fn new(id: usize, partition: String) -> Self {
        Self {
            id,
            proxy: None,
            window: None,
            session: partition,
            in_use: HashMap::new(),
        }
    }

    pub fn is_in_use_for(&self, host: &str) -> bool {
        self.in_use.get(host).copied().unwrap_or(false)
    }

    pub fn is_bound(&self) -> bool {
        self.window.is_some()
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|proxy| !proxy.trim().is_empty()))
}

fn window_or_none<'de, D>(deserializer: D) -> Result<Option<WindowId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .and_then(|raw| u32::try_from(raw).ok())
        .map(WindowId))
}
