use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::automation::reporter::RunReporter;
use crate::config::Config;
use crate::llm_client::CompletionService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn CompletionService>,
    pub config: Config,
    /// At most one run exists at a time; the last one stays here after it ends so its
    /// status can still be read.
    pub current_run: Arc<Mutex<Option<ActiveRun>>>,
}

impl AppState {
    pub fn new(llm: Arc<dyn CompletionService>, config: Config) -> Self {
        Self {
            llm,
            config,
            current_run: Arc::new(Mutex::new(None)),
        }
    }
}

pub struct ActiveRun {
    pub reporter: Arc<RunReporter>,
    pub stop: watch::Sender<bool>,
}
