//! A `WindowHost` that records every call instead of opening windows.

#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use captcha_harvester::{
    utils::ManualClock, CaptchaHarvester, Database, HarvesterConfig, OutboundMessage,
    SessionPool, ThemeOptions, WindowHost, WindowId, WindowRole, WindowSpec,
};

pub const HOST: &str = "https://shop.example.com";

#[derive(Debug, Clone)]
pub struct CreatedWindow {
    pub id: WindowId,
    pub role: WindowRole,
    pub url: String,
    pub partition: Option<String>,
    pub theme: ThemeOptions,
    pub user_agent: Option<String>,
    pub intercepted: bool,
}

#[derive(Debug, Default)]
pub struct HostLog {
    next_id: u32,
    pub created: Vec<CreatedWindow>,
    pub sent: Vec<(WindowId, OutboundMessage)>,
    pub closed: Vec<WindowId>,
    pub focused: Vec<WindowId>,
    pub reloaded: Vec<WindowId>,
    pub destroyed: HashSet<WindowId>,
    pub notifications: Vec<String>,
    pub proxies: Vec<(WindowId, Option<String>)>,
    pub cleared: Vec<WindowId>,
    pub fail_create: bool,
}

#[derive(Default)]
pub struct RecordingHost {
    log: Mutex<HostLog>,
}

impl RecordingHost {
    pub fn log(&self) -> MutexGuard<'_, HostLog> {
        self.log.lock().unwrap()
    }

    pub fn created(&self, id: WindowId) -> CreatedWindow {
        self.log()
            .created
            .iter()
            .find(|window| window.id == id)
            .cloned()
            .expect("window was never created")
    }

    pub fn sent_to(&self, id: WindowId) -> Vec<OutboundMessage> {
        self.log()
            .sent
            .iter()
            .filter(|(window, _)| *window == id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn starts_sent_to(&self, id: WindowId) -> usize {
        self.sent_to(id)
            .iter()
            .filter(|message| matches!(message, OutboundMessage::StartHarvestCaptcha { .. }))
            .count()
    }

    pub fn stops_sent_to(&self, id: WindowId) -> usize {
        self.sent_to(id)
            .iter()
            .filter(|message| matches!(message, OutboundMessage::StopHarvestCaptcha { .. }))
            .count()
    }

    pub fn mark_destroyed(&self, id: WindowId) {
        self.log().destroyed.insert(id);
    }
}

#[async_trait]
impl WindowHost for RecordingHost {
    fn create_window(&self, spec: WindowSpec) -> Result<WindowId> {
        let mut log = self.log();
        if log.fail_create {
            bail!("window creation disabled");
        }
        log.next_id += 1;
        let id = WindowId(log.next_id);
        log.created.push(CreatedWindow {
            id,
            role: spec.role,
            url: spec.url,
            partition: spec.partition,
            theme: spec.theme,
            user_agent: spec.user_agent,
            intercepted: spec.interceptor.is_some(),
        });
        Ok(id)
    }

    fn send(&self, window: WindowId, message: &OutboundMessage) -> Result<()> {
        self.log().sent.push((window, message.clone()));
        Ok(())
    }

    fn close(&self, window: WindowId) -> Result<()> {
        self.log().closed.push(window);
        Ok(())
    }

    fn focus(&self, window: WindowId) -> Result<()> {
        self.log().focused.push(window);
        Ok(())
    }

    fn reload(&self, window: WindowId) -> Result<()> {
        self.log().reloaded.push(window);
        Ok(())
    }

    fn is_destroyed(&self, window: WindowId) -> bool {
        self.log().destroyed.contains(&window)
    }

    fn notify(&self, title: &str) -> Result<()> {
        self.log().notifications.push(title.to_string());
        Ok(())
    }

    async fn set_proxy(&self, window: WindowId, proxy_rules: Option<String>) -> Result<()> {
        self.log().proxies.push((window, proxy_rules));
        Ok(())
    }

    async fn clear_session_data(&self, window: WindowId) -> Result<()> {
        self.log().cleared.push(window);
        Ok(())
    }
}

pub struct Harness {
    pub harvester: CaptchaHarvester,
    pub host: Arc<RecordingHost>,
    pub clock: Arc<ManualClock>,
    pub db: Database,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 29, 12, 0, 0).unwrap()
}

pub async fn harness() -> Harness {
    harness_with(HarvesterConfig::default()).await
}

pub async fn harness_with(config: HarvesterConfig) -> Harness {
    let db = Database::in_memory().unwrap();
    let sessions = SessionPool::generate(db.clone(), |index| config.partition_key(index))
        .await
        .unwrap();
    let host = Arc::new(RecordingHost::default());
    let clock = Arc::new(ManualClock::new(start_time()));
    let harvester =
        CaptchaHarvester::with_clock(config, sessions, host.clone(), clock.clone()).unwrap();

    Harness {
        harvester,
        host,
        clock,
        db,
    }
}

/// Lets spawned tasks (resume hooks) run to completion.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
