//! Caller-owned handle to the currently loaded search engine.

use std::sync::{Arc, RwLock};

use crate::search::SearchEngine;

/// Holds the engine a session queries against.
///
/// A new engine is published by swapping the whole `Arc` once it is fully
/// built; readers take a snapshot with [`current`](Self::current) and keep
/// querying it even if a newer engine is published meanwhile.
#[derive(Debug, Default)]
pub struct EngineHandle {
    current: RwLock<Option<Arc<SearchEngine>>>,
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the loaded engine, returning the previous one.
    pub fn publish(&self, engine: SearchEngine) -> Option<Arc<SearchEngine>> {
        let engine = Arc::new(engine);
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(images = engine.store().len(), "Publishing search engine");
        slot.replace(engine)
    }

    /// Snapshot of the loaded engine, if any.
    pub fn current(&self) -> Option<Arc<SearchEngine>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drop the loaded engine.
    pub fn clear(&self) -> Option<Arc<SearchEngine>> {
        self.current
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }
}
