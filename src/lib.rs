pub mod config;
pub mod db;
pub mod harvest;
pub mod models;
pub mod protocol;
pub mod queue;
pub mod sessions;
pub mod utils;
pub mod windows;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use log::info;

pub use config::HarvesterConfig;
pub use db::Database;
pub use harvest::{CaptchaHarvester, HarvestState, HarvestTarget, SpawnOptions};
pub use models::{HarvestedToken, PoolKind, SessionRecord, ThemeOptions, WindowId, WorkerWindow};
pub use protocol::{DebugQuery, InboundMessage, OutboundMessage};
pub use queue::{NextToken, PendingToken, TokenQueue};
pub use sessions::SessionPool;
pub use windows::{WindowHost, WindowRole, WindowSpec};

pub const CONFIG_FILE: &str = "harvester.json";
pub const DATABASE_FILE: &str = "harvester.sqlite3";

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

/// Loads the config, opens the session store and frees leases left over from
/// the previous run. Windows can be spawned as soon as this returns.
pub async fn bootstrap(data_dir: &Path, host: Arc<dyn WindowHost>) -> Result<CaptchaHarvester> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let config = HarvesterConfig::load(&data_dir.join(CONFIG_FILE))?;
    let database = Database::new(data_dir.join(DATABASE_FILE))?;

    let sessions = SessionPool::generate(database, |index| config.partition_key(index))
        .await
        .context("failed to load captcha sessions")?;

    info!(
        "Captcha harvester ready ({} windows per pool, backlog cap {})",
        config.max_windows_per_pool, config.max_backlog
    );
    CaptchaHarvester::new(config, sessions, host)
}
