//! Application state shared across request handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::orchestrator::Scheduler;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Arc<Config>,
    scheduler: Scheduler,
}

impl AppState {
    pub fn new(config: Arc<Config>, scheduler: Scheduler) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, scheduler }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }
}
