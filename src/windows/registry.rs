use std::collections::HashMap;

use crate::models::{PoolKind, WindowId, WorkerWindow};

#[derive(Debug, Default)]
struct SitePools {
    standard: Vec<WorkerWindow>,
    checkpoint: Vec<WorkerWindow>,
}

impl SitePools {
    fn pool(&self, kind: PoolKind) -> &Vec<WorkerWindow> {
        match kind {
            PoolKind::Standard => &self.standard,
            PoolKind::Checkpoint => &self.checkpoint,
        }
    }

    fn pool_mut(&mut self, kind: PoolKind) -> &mut Vec<WorkerWindow> {
        match kind {
            PoolKind::Standard => &mut self.standard,
            PoolKind::Checkpoint => &mut self.checkpoint,
        }
    }
}

/// Live worker windows per site-key and pool, plus a reverse index from
/// window id to its pool so sender checks and closes are lookups.
#[derive(Debug)]
pub struct WindowRegistry {
    sites: HashMap<String, SitePools>,
    index: HashMap<WindowId, (PoolKind, String)>,
    max_per_pool: usize,
}

impl WindowRegistry {
    pub fn new(max_per_pool: usize) -> Self {
        Self {
            sites: HashMap::new(),
            index: HashMap::new(),
            max_per_pool,
        }
    }

    pub fn max_per_pool(&self) -> usize {
        self.max_per_pool
    }

    pub fn count(&self, site_key: &str, kind: PoolKind) -> usize {
        self.sites
            .get(site_key)
            .map_or(0, |pools| pools.pool(kind).len())
    }

    pub fn has_capacity(&self, site_key: &str, kind: PoolKind) -> bool {
        self.count(site_key, kind) < self.max_per_pool
    }

    pub fn insert(&mut self, window: WorkerWindow) -> Result<(), WorkerWindow> {
        if self.index.contains_key(&window.id) || !self.has_capacity(&window.site_key, window.kind)
        {
            return Err(window);
        }

        self.index
            .insert(window.id, (window.kind, window.site_key.clone()));
        self.sites
            .entry(window.site_key.clone())
            .or_default()
            .pool_mut(window.kind)
            .push(window);
        Ok(())
    }

    /// Removes a window. Returns `None` if it was already gone, which makes
    /// repeated close notifications harmless.
    pub fn remove(&mut self, id: WindowId) -> Option<WorkerWindow> {
        let (kind, site_key) = self.index.remove(&id)?;
        let pool = self.sites.get_mut(&site_key)?.pool_mut(kind);
        let position = pool.iter().position(|window| window.id == id)?;
        Some(pool.remove(position))
    }

    pub fn get(&self, id: WindowId) -> Option<&WorkerWindow> {
        let (kind, site_key) = self.index.get(&id)?;
        self.sites
            .get(site_key)?
            .pool(*kind)
            .iter()
            .find(|window| window.id == id)
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn ids_in(&self, site_key: &str, kind: PoolKind) -> Vec<WindowId> {
        self.sites
            .get(site_key)
            .map(|pools| pools.pool(kind).iter().map(|window| window.id).collect())
            .unwrap_or_default()
    }

    pub fn ids_of_kind(&self, kind: PoolKind) -> Vec<WindowId> {
        self.sites
            .values()
            .flat_map(|pools| pools.pool(kind).iter().map(|window| window.id))
            .collect()
    }

    pub fn all_ids(&self) -> Vec<WindowId> {
        self.index.keys().copied().collect()
    }

    pub fn windows(&self) -> impl Iterator<Item = &WorkerWindow> {
        self.sites
            .values()
            .flat_map(|pools| pools.standard.iter().chain(pools.checkpoint.iter()))
    }
}
