use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PoolKind {
    Standard,
    Checkpoint,
}

impl PoolKind {
    pub fn from_checkpoint(checkpoint: bool) -> Self {
        if checkpoint {
            PoolKind::Checkpoint
        } else {
            PoolKind::Standard
        }
    }

    pub fn is_checkpoint(self) -> bool {
        matches!(self, PoolKind::Checkpoint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerWindow {
    pub id: WindowId,
    pub site_key: String,
    pub kind: PoolKind,
    /// Session leased at spawn; `None` when the pool was exhausted.
    pub session: Option<usize>,
    pub host: String,
}
