//! Application state shared across all request handlers.

use poolsight_core::query::QueryService;
use prometheus::Registry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether block ingestion is still alive.
#[derive(Debug, Clone, Default)]
pub struct IngestHealth {
    halted: Arc<AtomicBool>,
}

impl IngestHealth {
    pub fn mark_halted(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
    pub registry: Registry,
    pub ingest: IngestHealth,
}

impl AppState {
    pub fn new(query: QueryService, registry: Registry) -> Self {
        Self {
            query,
            registry,
            ingest: IngestHealth::default(),
        }
    }
}
