//! HTTP API for `ProMoAI` sessions

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::llm::LlmConfig;
use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    /// Server-side fallbacks for provider, model and API keys
    pub llm: Arc<LlmConfig>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, llm: Arc<LlmConfig>) -> Self {
        Self { sessions, llm }
    }
}
