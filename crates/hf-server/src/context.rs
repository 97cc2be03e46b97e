//! Shared application context.
//!
//! [`AppContext`] is handed to every route handler via Axum state. Everything
//! in it is behind an `Arc`, so cloning per request is cheap.

use std::sync::Arc;

use hf_av::{ToolRegistry, Transcoder};
use hf_core::config::Config;
use hf_core::events::EventBus;
use hf_store::MediaStore;

use crate::scheduler::TranscodeScheduler;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<MediaStore>,
    pub scheduler: Arc<TranscodeScheduler>,
    pub tools: Arc<ToolRegistry>,
    pub event_bus: Arc<EventBus>,
}

impl AppContext {
    /// Wire up a context around `transcoder`, rooted at the configured media
    /// directory.
    pub fn new(config: Config, tools: ToolRegistry, transcoder: Arc<dyn Transcoder>) -> Self {
        let store = Arc::new(MediaStore::new(config.storage.media_root.clone()));
        let event_bus = Arc::new(EventBus::default());
        let scheduler = Arc::new(TranscodeScheduler::new(
            store.clone(),
            transcoder,
            event_bus.clone(),
        ));

        Self {
            config: Arc::new(config),
            store,
            scheduler,
            tools: Arc::new(tools),
            event_bus,
        }
    }
}
