use anyhow::{Context, Result};
use log::{debug, error, info, warn};

use crate::{
    db::Database,
    models::{SessionRecord, WindowId},
};

pub const SESSION_COUNT: usize = 5;

pub const SESSIONS_KEY: &str = "captchaSessions";

/// The five reusable sessions and their leases.
///
/// Every mutation updates memory first and then writes the whole array back.
/// A failed write is logged and the in-memory state is kept, so the durable
/// copy can lag behind until the next successful write.
pub struct SessionPool {
    sessions: Vec<SessionRecord>,
    db: Database,
}

impl SessionPool {
    /// Loads the persisted sessions, or creates a fresh set when the record is
    /// missing, unparsable or the wrong size. Leases from a previous run are
    /// always cleared.
    pub async fn generate(db: Database, partition_key: impl Fn(usize) -> String) -> Result<Self> {
        let stored = db
            .get_value(SESSIONS_KEY)
            .await
            .context("failed to read persisted sessions")?;

        let loaded = match stored {
            None => None,
            Some(raw) => match serde_json::from_str::<Vec<SessionRecord>>(&raw) {
                Ok(sessions) if is_well_formed(&sessions) => Some(sessions),
                Ok(sessions) => {
                    warn!(
                        "Persisted sessions have {} entries (expected {SESSION_COUNT}); regenerating",
                        sessions.len()
                    );
                    None
                }
                Err(err) => {
                    warn!("Persisted sessions are malformed ({err}); regenerating");
                    None
                }
            },
        };

        let mut pool = match loaded {
            Some(sessions) => Self { sessions, db },
            None => {
                if let Err(err) = db.delete_value(SESSIONS_KEY).await {
                    error!("Failed to discard persisted sessions: {err:#}");
                }
                let sessions = (0..SESSION_COUNT)
                    .map(|index| SessionRecord::new(index, partition_key(index)))
                    .collect();
                info!("Generated {SESSION_COUNT} fresh captcha sessions");
                Self { sessions, db }
            }
        };

        pool.free_all().await;
        Ok(pool)
    }

    pub async fn free_all(&mut self) {
        debug!("Freeing all captcha sessions");
        for session in &mut self.sessions {
            session.in_use.clear();
            session.window = None;
        }
        self.persist().await;
    }

    /// Leases the lowest-numbered session that is not bound to a window and
    /// not already in use for `host`.
    pub async fn lease(&mut self, host: &str) -> Option<usize> {
        let session = self
            .sessions
            .iter_mut()
            .find(|session| !session.is_bound() && !session.is_in_use_for(host))?;
        session.in_use.insert(host.to_string(), true);
        let id = session.id;

        self.persist().await;
        Some(id)
    }

    pub async fn bind(&mut self, session_id: usize, window: WindowId) {
        let Some(session) = self.get_mut(session_id) else {
            warn!("Cannot bind window {window} to unknown session {session_id}");
            return;
        };
        session.window = Some(window);
        self.persist().await;
    }

    /// Undoes a lease. The window binding is only cleared when it still points
    /// at `window`.
    pub async fn release(&mut self, session_id: usize, window: Option<WindowId>, host: &str) {
        let Some(session) = self.get_mut(session_id) else {
            warn!("Cannot release unknown session {session_id}");
            return;
        };
        if window.is_none() || session.window == window {
            session.window = None;
        }
        session.in_use.remove(host);
        self.persist().await;
    }

    pub async fn update_proxy(&mut self, session_id: usize, proxy: Option<String>) {
        let Some(session) = self.get_mut(session_id) else {
            warn!("Cannot set proxy on unknown session {session_id}");
            return;
        };
        session.proxy = proxy.filter(|value| !value.trim().is_empty());
        self.persist().await;
    }

    pub fn get(&self, session_id: usize) -> Option<&SessionRecord> {
        self.sessions.iter().find(|session| session.id == session_id)
    }

    pub fn records(&self) -> &[SessionRecord] {
        &self.sessions
    }

    fn get_mut(&mut self, session_id: usize) -> Option<&mut SessionRecord> {
        self.sessions
            .iter_mut()
            .find(|session| session.id == session_id)
    }

    async fn persist(&self) {
        let serialized = match serde_json::to_string(&self.sessions) {
            Ok(serialized) => serialized,
            Err(err) => {
                error!("Failed to serialize captcha sessions: {err}");
                return;
            }
        };

        if let Err(err) = self.db.set_value(SESSIONS_KEY, serialized).await {
            error!("Failed to persist captcha sessions: {err:#}");
        }
    }
}

fn is_well_formed(sessions: &[SessionRecord]) -> bool {
    sessions.len() == SESSION_COUNT
        && sessions
            .iter()
            .enumerate()
            .all(|(index, session)| session.id == index)
}
