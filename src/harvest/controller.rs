use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, info, warn};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::{
    config::HarvesterConfig,
    models::{
        theme::CHECKPOINT_BACKGROUND, HarvestedToken, PoolKind, SessionRecord, ThemeOptions,
        WindowId, WorkerWindow,
    },
    protocol::{DebugQuery, OutboundMessage, DEFAULT_TOKEN_HOST, UNATTACHED_SITE_KEY},
    queue::{ExpirationPredicate, NextToken, TokenQueue, UpdateCallback},
    sessions::{format_proxy, SessionPool},
    utils::{Clock, SystemClock},
    windows::{CompanionWindows, Interceptor, WindowHost, WindowRegistry, WindowRole, WindowSpec},
};

use super::{HarvestState, HarvestTarget};

const NOTIFICATION_TITLE: &str = "Waiting for captcha";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub request_id: String,
    pub site_key: String,
    pub host: String,
    pub checkpoint: bool,
    pub background_color: Option<String>,
}

impl SpawnOptions {
    pub fn new(
        request_id: impl Into<String>,
        site_key: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            site_key: site_key.into(),
            host: host.into(),
            checkpoint: false,
            background_color: None,
        }
    }

    pub fn checkpoint(mut self, checkpoint: bool) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }
}

impl From<&HarvestTarget> for SpawnOptions {
    fn from(target: &HarvestTarget) -> Self {
        SpawnOptions::new(&target.request_id, &target.site_key, &target.host)
            .checkpoint(target.checkpoint)
    }
}

struct HarvesterState {
    registry: WindowRegistry,
    companions: CompanionWindows,
    statuses: HashMap<String, HarvestState>,
    queues: HashMap<String, TokenQueue>,
    sessions: SessionPool,
    theme: ThemeOptions,
}

struct Shared {
    state: Mutex<HarvesterState>,
    host: Arc<dyn WindowHost>,
    config: HarvesterConfig,
    clock: Arc<dyn Clock>,
    interceptor: Arc<Interceptor>,
    shutdown: CancellationToken,
}

/// Host calls made while the state lock is held rely on the [`WindowHost`]
/// contract that they never call back into the harvester synchronously.
#[derive(Clone)]
pub struct CaptchaHarvester {
    inner: Arc<Shared>,
}

impl CaptchaHarvester {
    pub fn new(
        config: HarvesterConfig,
        sessions: SessionPool,
        host: Arc<dyn WindowHost>,
    ) -> Result<Self> {
        Self::with_clock(config, sessions, host, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: HarvesterConfig,
        sessions: SessionPool,
        host: Arc<dyn WindowHost>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let interceptor =
            Interceptor::from_config(&config.intercept_pattern, config.harvest_page.as_ref())
                .context("failed to set up request interception")?;

        let state = HarvesterState {
            registry: WindowRegistry::new(config.max_windows_per_pool),
            companions: CompanionWindows::new(),
            statuses: HashMap::new(),
            queues: HashMap::new(),
            sessions,
            theme: ThemeOptions::new(),
        };

        Ok(Self {
            inner: Arc::new(Shared {
                state: Mutex::new(state),
                host,
                config,
                clock,
                interceptor: Arc::new(interceptor),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn config(&self) -> &HarvesterConfig {
        &self.inner.config
    }

    async fn lock(&self) -> MutexGuard<'_, HarvesterState> {
        self.inner.state.lock().await
    }

    pub async fn start_harvesting(
        &self,
        request_id: &str,
        site_key: &str,
        host: &str,
        checkpoint: bool,
    ) -> Result<()> {
        let target = HarvestTarget::new(request_id, site_key, host, checkpoint);
        let mut state = self.lock().await;
        self.start_locked(&mut state, target).await
    }

    async fn start_locked(&self, state: &mut HarvesterState, target: HarvestTarget) -> Result<()> {
        info!(
            "Starting harvest for {} (request {}, checkpoint: {})",
            target.site_key, target.request_id, target.checkpoint
        );

        state
            .statuses
            .entry(target.site_key.clone())
            .and_modify(|status| status.activate(target.clone()))
            .or_insert_with(|| HarvestState::Active(target.clone()));

        let existing = state.registry.ids_in(&target.site_key, target.pool_kind());
        if existing.is_empty() {
            self.spawn_locked(state, SpawnOptions::from(&target)).await?;
        } else {
            self.broadcast(
                &existing,
                &OutboundMessage::StartHarvestCaptcha {
                    request_id: target.request_id,
                    site_key: target.site_key,
                    host: target.host,
                },
            );
        }
        Ok(())
    }

    pub async fn suspend_harvesting(&self, request_id: &str, site_key: &str, host: &str) {
        let mut state = self.lock().await;
        let Some(status) = state.statuses.get_mut(site_key) else {
            warn!("Cannot suspend unknown site-key {site_key}");
            return;
        };
        status.suspend();
        let kind = status.pool_kind();
        info!("Suspending harvest for {site_key}");

        let windows = state.registry.ids_in(site_key, kind);
        self.broadcast(&windows, &stop_message(request_id, site_key, host));
    }

    pub async fn stop_harvesting(&self, request_id: &str, site_key: &str, host: &str) {
        let mut state = self.lock().await;
        let Some(status) = state.statuses.get_mut(site_key) else {
            warn!("Cannot stop unknown site-key {site_key}");
            return;
        };
        status.stop();
        let kind = status.pool_kind();
        info!("Stopping harvest for {site_key}");

        let windows = state.registry.ids_in(site_key, kind);
        self.broadcast(&windows, &stop_message(request_id, site_key, host));
    }

    async fn resume_if_drained(&self, site_key: &str) {
        let mut state = self.lock().await;
        let backlog = state
            .queues
            .get(site_key)
            .map_or(0, TokenQueue::backlog_length);
        if backlog >= self.inner.config.max_backlog {
            return;
        }
        let Some(target) = state
            .statuses
            .get(site_key)
            .and_then(HarvestState::resume_target)
            .cloned()
        else {
            return;
        };

        info!("Backlog for {site_key} down to {backlog}; resuming harvesters");
        if let Err(err) = self.start_locked(&mut state, target).await {
            error!("Failed to resume harvest for {site_key}: {err:#}");
        }
    }

    pub async fn harvest_state(&self, site_key: &str) -> Option<HarvestState> {
        self.lock().await.statuses.get(site_key).cloned()
    }

    pub async fn harvest_token(
        &self,
        request_id: &str,
        token: impl Into<String>,
        site_key: Option<String>,
        host: Option<String>,
    ) -> usize {
        let site_key = site_key.unwrap_or_else(|| UNATTACHED_SITE_KEY.to_string());
        let host = host.unwrap_or_else(|| DEFAULT_TOKEN_HOST.to_string());
        let token = HarvestedToken::new(token, &site_key, &host, self.inner.clock.now());

        let (backlog, should_suspend) = {
            let mut state = self.lock().await;
            let backlog = self.queue_for(&mut state, &site_key).insert(token);
            let active = state
                .statuses
                .get(&site_key)
                .is_some_and(HarvestState::is_active);
            (backlog, active && backlog >= self.inner.config.max_backlog)
        };
        debug!("Harvested token for {site_key}; backlog {backlog}");

        if should_suspend {
            info!(
                "Token backlog for {site_key} reached {}; suspending",
                self.inner.config.max_backlog
            );
            self.suspend_harvesting(request_id, &site_key, &host).await;
        }
        backlog
    }

    pub async fn get_next_captcha(&self, site_key: &str) -> NextToken {
        let mut state = self.lock().await;
        self.queue_for(&mut state, site_key).next()
    }

    pub async fn backlog_length(&self, site_key: &str) -> usize {
        self.lock()
            .await
            .queues
            .get(site_key)
            .map_or(0, TokenQueue::backlog_length)
    }

    fn queue_for(&self, state: &mut HarvesterState, site_key: &str) -> TokenQueue {
        if let Some(queue) = state.queues.get(site_key) {
            return queue.clone();
        }

        let queue = TokenQueue::new();
        let clock = self.inner.clock.clone();
        let ttl = self.inner.config.token_ttl();
        let keep: ExpirationPredicate =
            Arc::new(move |token: &HarvestedToken| token.is_fresh(clock.now(), ttl));
        queue.add_expiration_filter(
            keep,
            self.inner.config.sweep_interval(),
            Some(self.resume_callback(site_key)),
        );

        state.queues.insert(site_key.to_string(), queue.clone());
        queue
    }

    fn resume_callback(&self, site_key: &str) -> UpdateCallback {
        let weak = Arc::downgrade(&self.inner);
        let site_key = site_key.to_string();
        Arc::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.shutdown.is_cancelled() {
                return;
            }
            let harvester = CaptchaHarvester { inner };
            let site_key = site_key.clone();
            tokio::spawn(async move {
                harvester.resume_if_drained(&site_key).await;
            });
        })
    }

    /// Opens a harvesting window unless the pool is full (`Ok(None)`). A
    /// window that cannot get a session still opens, unproxied.
    pub async fn spawn_window(&self, options: SpawnOptions) -> Result<Option<WindowId>> {
        let mut state = self.lock().await;
        self.spawn_locked(&mut state, options).await
    }

    async fn spawn_locked(
        &self,
        state: &mut HarvesterState,
        options: SpawnOptions,
    ) -> Result<Option<WindowId>> {
        let kind = PoolKind::from_checkpoint(options.checkpoint);
        state
            .statuses
            .entry(options.site_key.clone())
            .or_insert_with(|| {
                HarvestState::Idle(HarvestTarget::new(
                    &options.request_id,
                    &options.site_key,
                    &options.host,
                    options.checkpoint,
                ))
            });

        if !state.registry.has_capacity(&options.site_key, kind) {
            warn!(
                "{kind:?} pool for {} already has {} windows; not spawning",
                options.site_key,
                state.registry.max_per_pool()
            );
            return Ok(None);
        }

        if let Some(color) = &options.background_color {
            state.theme.set_background(color.clone());
        }

        let session = state.sessions.lease(&options.host).await;
        if session.is_none() {
            warn!(
                "No free session for {}; opening window without a proxy",
                options.host
            );
        }

        let mut theme = state.theme.clone();
        if kind.is_checkpoint() {
            theme.set_background(CHECKPOINT_BACKGROUND);
        }
        let spec = WindowSpec {
            role: match kind {
                PoolKind::Standard => WindowRole::Harvester,
                PoolKind::Checkpoint => WindowRole::Checkpoint,
            },
            url: options.host.clone(),
            partition: session
                .and_then(|id| state.sessions.get(id))
                .map(|record| record.session.clone()),
            theme,
            user_agent: None,
            interceptor: Some(self.inner.interceptor.clone()),
        };

        let id = match self.inner.host.create_window(spec) {
            Ok(id) => id,
            Err(err) => {
                if let Some(session) = session {
                    state.sessions.release(session, None, &options.host).await;
                }
                return Err(err).context("failed to create harvesting window");
            }
        };

        let window = WorkerWindow {
            id,
            site_key: options.site_key.clone(),
            kind,
            session,
            host: options.host.clone(),
        };
        if let Err(window) = state.registry.insert(window) {
            if let Some(session) = session {
                state.sessions.release(session, None, &options.host).await;
            }
            bail!("host returned window id {} which is already tracked", window.id);
        }
        if let Some(session) = session {
            state.sessions.bind(session, id).await;
        }

        info!(
            "Opened {kind:?} window {id} for {} (session {})",
            options.site_key,
            session.map_or_else(|| "none".to_string(), |s| s.to_string())
        );
        Ok(Some(id))
    }

    pub async fn on_ready_to_show(&self, window: WindowId) {
        let (proxy, active) = {
            let state = self.lock().await;
            let Some(worker) = state.registry.get(window) else {
                debug!("Ignoring ready-to-show for untracked window {window}");
                return;
            };
            let proxy = worker
                .session
                .and_then(|id| state.sessions.get(id))
                .and_then(|record| record.proxy.clone());
            let active = state
                .statuses
                .get(&worker.site_key)
                .filter(|status| status.is_active())
                .map(|status| status.target().clone());
            (proxy, active)
        };

        let host = &self.inner.host;
        let rules = match &proxy {
            Some(proxy) => {
                if let Err(err) = host.send(
                    window,
                    &OutboundMessage::RequestShowProxy {
                        proxy: proxy.clone(),
                    },
                ) {
                    warn!("Failed to show proxy in window {window}: {err:#}");
                }
                format_proxy(proxy)
            }
            None => None,
        };
        if let Err(err) = host.set_proxy(window, rules).await {
            error!("Failed to apply proxy to window {window}: {err:#}");
        }

        if let Some(target) = active {
            let message = OutboundMessage::StartHarvestCaptcha {
                request_id: target.request_id,
                site_key: target.site_key,
                host: target.host,
            };
            if let Err(err) = host.send(window, &message) {
                warn!("Failed to start harvesting in window {window}: {err:#}");
            }
            if self.inner.config.notifications {
                if let Err(err) = host.notify(NOTIFICATION_TITLE) {
                    debug!("Notification failed: {err:#}");
                }
            }
        }
    }

    pub async fn on_window_closed(&self, window: WindowId) {
        self.cleanup_window(window).await;
    }

    pub async fn on_window_destroyed(&self, window: WindowId) {
        debug!("Window {window} destroyed outside the close path");
        self.cleanup_window(window).await;
    }

    /// Drops the window from its pool, releases its session and closes its
    /// companion. Later calls for the same window do nothing.
    async fn cleanup_window(&self, window: WindowId) {
        let companion = {
            let mut state = self.lock().await;
            if let Some(worker) = state.registry.remove(window) {
                debug!("Window {window} for {} closed", worker.site_key);
                if let Some(session) = worker.session {
                    state
                        .sessions
                        .release(session, Some(window), &worker.host)
                        .await;
                }
                state.companions.remove_parent(window)
            } else {
                if let Some(parent) = state.companions.remove_companion(window) {
                    debug!("Companion {window} of window {parent} closed");
                }
                None
            }
        };

        if let Some(companion) = companion {
            if let Err(err) = self.inner.host.close(companion) {
                warn!("Failed to close companion window {companion}: {err:#}");
            }
        }
    }

    pub async fn close_window(&self, window: WindowId) -> Result<()> {
        self.inner
            .host
            .close(window)
            .with_context(|| format!("failed to close window {window}"))?;
        self.cleanup_window(window).await;
        Ok(())
    }

    pub async fn close_all_windows(&self) {
        let windows = self.lock().await.registry.all_ids();
        if windows.is_empty() {
            return;
        }

        info!("Closing {} harvesting windows", windows.len());
        for window in windows {
            if let Err(err) = self.close_window(window).await {
                warn!("{err:#}");
            }
        }
    }

    pub async fn change_theme(&self, options: ThemeOptions) {
        let mut state = self.lock().await;
        state.theme.merge(&options);
        let windows = state.registry.ids_of_kind(PoolKind::Standard);
        let message = OutboundMessage::ChangeTheme {
            options: state.theme.clone(),
        };
        self.broadcast(&windows, &message);
    }

    pub async fn theme(&self) -> ThemeOptions {
        self.lock().await.theme.clone()
    }

    pub async fn is_valid_sender(&self, window: WindowId) -> bool {
        let tracked = self.lock().await.registry.contains(window);
        tracked && !self.inner.host.is_destroyed(window)
    }

    pub async fn save_proxy(&self, window: WindowId, proxy: Option<String>) -> Result<()> {
        {
            let mut state = self.lock().await;
            let Some(session) = state.registry.get(window).map(|worker| worker.session) else {
                bail!("window {window} is not a harvesting window");
            };
            match session {
                Some(session) => {
                    info!("Updating proxy for session {session}");
                    state.sessions.update_proxy(session, proxy.clone()).await;
                }
                None => debug!("Window {window} has no session; proxy is not persisted"),
            }
        }

        let rules = proxy.as_deref().and_then(format_proxy);
        self.inner
            .host
            .set_proxy(window, rules)
            .await
            .with_context(|| format!("failed to apply proxy to window {window}"))
    }

    pub async fn end_session(&self, window: WindowId) -> Result<()> {
        info!("Ending session for window {window}");
        self.inner
            .host
            .clear_session_data(window)
            .await
            .with_context(|| format!("failed to clear session data for window {window}"))?;

        let companion = self.lock().await.companions.remove_parent(window);
        if let Some(companion) = companion {
            self.inner
                .host
                .close(companion)
                .with_context(|| format!("failed to close companion window {companion}"))?;
        }
        Ok(())
    }

    pub fn refresh(&self, window: WindowId) -> Result<()> {
        self.inner
            .host
            .reload(window)
            .with_context(|| format!("failed to reload window {window}"))
    }

    pub async fn launch_companion(&self, parent: WindowId) -> Result<WindowId> {
        let host = &self.inner.host;
        let mut state = self.lock().await;

        if let Some(existing) = state.companions.companion_of(parent) {
            drop(state);
            host.focus(existing)
                .with_context(|| format!("failed to focus companion window {existing}"))?;
            return Ok(existing);
        }

        let worker = state
            .registry
            .get(parent)
            .ok_or_else(|| anyhow!("window {parent} is not a harvesting window"))?;
        let partition = worker
            .session
            .and_then(|id| state.sessions.get(id))
            .map(|record| record.session.clone());

        let spec = WindowSpec {
            role: WindowRole::Companion,
            url: self.inner.config.companion_url.clone(),
            partition,
            theme: ThemeOptions::new(),
            user_agent: Some(self.inner.config.companion_user_agent.clone()),
            interceptor: None,
        };
        let companion = host
            .create_window(spec)
            .context("failed to create companion window")?;
        state.companions.insert(parent, companion);
        drop(state);

        info!("Opened companion window {companion} for {parent}");
        if let Err(err) = host.focus(companion) {
            warn!("Failed to focus companion window {companion}: {err:#}");
        }
        Ok(companion)
    }

    pub async fn companion_of(&self, parent: WindowId) -> Option<WindowId> {
        self.lock().await.companions.companion_of(parent)
    }

    pub async fn window_count(&self, site_key: &str, kind: PoolKind) -> usize {
        self.lock().await.registry.count(site_key, kind)
    }

    pub async fn windows(&self) -> Vec<WorkerWindow> {
        self.lock().await.registry.windows().cloned().collect()
    }

    pub async fn sessions(&self) -> Vec<SessionRecord> {
        self.lock().await.sessions.records().to_vec()
    }

    pub async fn debug_query(&self, query: DebugQuery, site_key: &str) -> Option<String> {
        if !self.inner.config.debug {
            return None;
        }

        let state = self.lock().await;
        let answer = match query {
            DebugQuery::QueueStats => {
                let (line, backlog) = state
                    .queues
                    .get(site_key)
                    .map_or((0, 0), |queue| (queue.line_length(), queue.backlog_length()));
                format!("Queue Line Length: {line}, Backlog Length: {backlog}")
            }
            DebugQuery::HarvestState => {
                let label = state
                    .statuses
                    .get(site_key)
                    .map_or("idle", HarvestState::label);
                format!("State: {label}")
            }
        };
        Some(answer)
    }

    pub async fn shutdown(&self) {
        info!("Shutting down captcha harvester");
        self.inner.shutdown.cancel();

        let companions = {
            let state = self.lock().await;
            for queue in state.queues.values() {
                queue.destroy();
            }
            state.companions.ids()
        };

        self.close_all_windows().await;

        for companion in companions {
            if self.lock().await.companions.remove_companion(companion).is_none() {
                continue;
            }
            if let Err(err) = self.inner.host.close(companion) {
                warn!("Failed to close companion window {companion}: {err:#}");
            }
        }
    }

    fn broadcast(&self, windows: &[WindowId], message: &OutboundMessage) {
        for window in windows {
            if let Err(err) = self.inner.host.send(*window, message) {
                warn!("Failed to send message to window {window}: {err:#}");
            }
        }
    }
}

fn stop_message(request_id: &str, site_key: &str, host: &str) -> OutboundMessage {
    OutboundMessage::StopHarvestCaptcha {
        request_id: request_id.to_string(),
        site_key: site_key.to_string(),
        host: host.to_string(),
    }
}
