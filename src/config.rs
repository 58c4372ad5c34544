use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMPANION_URL: &str = "https://accounts.google.com/signin/v2/identifier?hl=en&service=youtube&continue=https%3A%2F%2Fwww.youtube.com%2Fsignin%3Ffeature%3Dsign_in_button%26hl%3Den%26app%3Ddesktop%26next%3D%252F%26action_handle_signin%3Dtrue&passive=true&uilel=3&flowName=GlifWebSignIn&flowEntry=ServiceLogin";
pub const DEFAULT_COMPANION_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:70.0) Gecko/20100101 Firefox/70.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Hard cap per site-key, counted separately for standard and checkpoint pools.
    pub max_windows_per_pool: usize,
    pub max_backlog: usize,
    pub token_ttl_secs: u64,
    pub sweep_interval_ms: u64,
    pub persist_sessions: bool,
    /// Case-insensitive regex of request URLs answered with the harvesting page.
    pub intercept_pattern: String,
    pub harvest_page: Option<PathBuf>,
    pub companion_url: String,
    pub companion_user_agent: String,
    pub notifications: bool,
    pub debug: bool,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            max_windows_per_pool: 5,
            max_backlog: 5,
            token_ttl_secs: 120,
            sweep_interval_ms: 1000,
            persist_sessions: true,
            intercept_pattern: "supreme|shopify".into(),
            harvest_page: None,
            companion_url: DEFAULT_COMPANION_URL.into(),
            companion_user_agent: DEFAULT_COMPANION_USER_AGENT.into(),
            notifications: true,
            debug: false,
        }
    }
}

impl HarvesterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!(
                        "Ignoring malformed config at {}: {err}; using defaults",
                        path.display()
                    );
                    Self::default()
                }
            }
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("HARVESTER_DEBUG") {
            self.debug = value == "1" || value.eq_ignore_ascii_case("true");
        }
    }

    /// Saturates at `chrono::Duration::MAX` for TTLs chrono cannot represent.
    pub fn token_ttl(&self) -> chrono::Duration {
        i64::try_from(self.token_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn partition_key(&self, index: usize) -> String {
        if self.persist_sessions {
            format!("persist:{index}")
        } else {
            index.to_string()
        }
    }
}
