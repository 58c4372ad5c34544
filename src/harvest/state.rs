use serde::Serialize;

use crate::models::PoolKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestTarget {
    pub request_id: String,
    pub site_key: String,
    pub host: String,
    pub checkpoint: bool,
}

impl HarvestTarget {
    pub fn new(
        request_id: impl Into<String>,
        site_key: impl Into<String>,
        host: impl Into<String>,
        checkpoint: bool,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            site_key: site_key.into(),
            host: host.into(),
            checkpoint,
        }
    }

    pub fn pool_kind(&self) -> PoolKind {
        PoolKind::from_checkpoint(self.checkpoint)
    }
}

/// Harvesting status of one site-key.
///
/// Every state keeps the last request it was driven by, so a suspended
/// site-key can be resumed with the same parameters and stop/suspend
/// broadcasts know which pool to address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "target", rename_all = "camelCase")]
pub enum HarvestState {
    Idle(HarvestTarget),
    Active(HarvestTarget),
    #[serde(rename = "suspend")]
    Suspended(HarvestTarget),
}

impl HarvestState {
    pub fn target(&self) -> &HarvestTarget {
        match self {
            HarvestState::Idle(target)
            | HarvestState::Active(target)
            | HarvestState::Suspended(target) => target,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HarvestState::Idle(_) => "idle",
            HarvestState::Active(_) => "active",
            HarvestState::Suspended(_) => "suspend",
        }
    }

    pub fn pool_kind(&self) -> PoolKind {
        self.target().pool_kind()
    }

    pub fn is_active(&self) -> bool {
        matches!(self, HarvestState::Active(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, HarvestState::Suspended(_))
    }

    pub fn activate(&mut self, target: HarvestTarget) {
        *self = HarvestState::Active(target);
    }

    pub fn suspend(&mut self) {
        *self = HarvestState::Suspended(self.target().clone());
    }

    pub fn stop(&mut self) {
        *self = HarvestState::Idle(self.target().clone());
    }

    /// The request to restart with, if this site-key is waiting on backlog.
    pub fn resume_target(&self) -> Option<&HarvestTarget> {
        match self {
            HarvestState::Suspended(target) => Some(target),
            _ => None,
        }
    }
}
