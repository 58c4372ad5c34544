use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    models::{ThemeOptions, WindowId},
    protocol::OutboundMessage,
};

use super::Interceptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRole {
    Harvester,
    Checkpoint,
    Companion,
}

#[derive(Clone)]
pub struct WindowSpec {
    pub role: WindowRole,
    pub url: String,
    /// Cookie-jar partition; `None` means the host's default session.
    pub partition: Option<String>,
    pub theme: ThemeOptions,
    pub user_agent: Option<String>,
    pub interceptor: Option<Arc<Interceptor>>,
}

/// The application side that owns real windows.
///
/// Calls are commands; none of them may call back into the harvester before
/// returning. Lifecycle changes are reported later through
/// `CaptchaHarvester::on_ready_to_show`, `on_window_closed` and
/// `on_window_destroyed`.
#[async_trait]
pub trait WindowHost: Send + Sync {
    fn create_window(&self, spec: WindowSpec) -> Result<WindowId>;

    fn send(&self, window: WindowId, message: &OutboundMessage) -> Result<()>;

    fn close(&self, window: WindowId) -> Result<()>;

    fn focus(&self, window: WindowId) -> Result<()>;

    fn reload(&self, window: WindowId) -> Result<()>;

    /// True once the window's contents are gone, even if the close event has
    /// not been delivered yet.
    fn is_destroyed(&self, window: WindowId) -> bool;

    fn notify(&self, title: &str) -> Result<()>;

    async fn set_proxy(&self, window: WindowId, proxy_rules: Option<String>) -> Result<()>;

    async fn clear_session_data(&self, window: WindowId) -> Result<()>;
}
