use std::collections::HashMap;

use crate::models::WindowId;

/// One companion window per harvester window, looked up from either side.
#[derive(Debug, Default)]
pub struct CompanionWindows {
    by_parent: HashMap<WindowId, WindowId>,
    by_companion: HashMap<WindowId, WindowId>,
}

impl CompanionWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: WindowId, companion: WindowId) {
        if let Some(previous) = self.by_parent.insert(parent, companion) {
            self.by_companion.remove(&previous);
        }
        self.by_companion.insert(companion, parent);
    }

    pub fn companion_of(&self, parent: WindowId) -> Option<WindowId> {
        self.by_parent.get(&parent).copied()
    }

    /// Forgets the pairing for a parent that is going away and returns the
    /// companion that should be closed with it.
    pub fn remove_parent(&mut self, parent: WindowId) -> Option<WindowId> {
        let companion = self.by_parent.remove(&parent)?;
        self.by_companion.remove(&companion);
        Some(companion)
    }

    pub fn remove_companion(&mut self, companion: WindowId) -> Option<WindowId> {
        let parent = self.by_companion.remove(&companion)?;
        self.by_parent.remove(&parent);
        Some(parent)
    }

    pub fn ids(&self) -> Vec<WindowId> {
        self.by_companion.keys().copied().collect()
    }
}
