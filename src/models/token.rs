use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestedToken {
    pub token: String,
    pub site_key: String,
    pub host: String,
    pub timestamp: DateTime<Utc>,
}

impl HarvestedToken {
    pub fn new(
        token: impl Into<String>,
        site_key: impl Into<String>,
        host: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            site_key: site_key.into(),
            host: host.into(),
            timestamp,
        }
    }

    /// A token is usable for `ttl` after it was harvested, exclusive.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.timestamp < ttl
    }
}
