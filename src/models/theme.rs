use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CHECKPOINT_BACKGROUND: &str = "#000";

/// Free-form theme options pushed to harvester windows.
///
/// Keys are whatever the window UI understands; the only one the harvester
/// itself reads is `backgroundColor`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeOptions(pub Map<String, Value>);

impl ThemeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn background_color(&self) -> Option<&str> {
        self.0.get("backgroundColor").and_then(Value::as_str)
    }

    pub fn set_background(&mut self, color: impl Into<String>) {
        self.0
            .insert("backgroundColor".into(), Value::String(color.into()));
    }

    pub fn merge(&mut self, other: &ThemeOptions) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}
