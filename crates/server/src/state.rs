//! Shared application state

use std::sync::Arc;

use parley_config::Settings;
use parley_core::CarrierControl;
use parley_persistence::CallLogStore;
use parley_store::CallStateStore;

use crate::call::CallRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Cross-process call-state tier (Redis) or the in-memory fallback
    pub store: Arc<dyn CallStateStore>,
    /// Durable calls/transcripts/logs/agents
    pub log_store: Arc<dyn CallLogStore>,
    /// Carrier REST commands
    pub control: Arc<dyn CarrierControl>,
    /// Live calls on this worker
    pub calls: Arc<CallRegistry>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<dyn CallStateStore>,
        log_store: Arc<dyn CallLogStore>,
        control: Arc<dyn CarrierControl>,
    ) -> Self {
        let max_calls = settings.server.max_concurrent_calls;
        Self {
            settings,
            store,
            log_store,
            control,
            calls: Arc::new(CallRegistry::new(max_calls)),
        }
    }
}
