//! Effects produced by state transitions

use super::event::GenerationInput;
use super::state::OperationTicket;
use crate::llm::AiConfig;
use crate::process::CanonicalModel;
use crate::runtime::GatewayError;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Dispatch a generation to the gateway (spawns as background task)
    RunGeneration {
        ticket: OperationTicket,
        input: GenerationInput,
    },

    /// Dispatch a feedback round to the gateway (spawns as background task)
    RunUpdate {
        ticket: OperationTicket,
        model: Arc<CanonicalModel>,
        feedback: String,
        ai: AiConfig,
    },

    /// Answer the caller waiting on `ticket`
    ResolveOperation {
        ticket: OperationTicket,
        outcome: Result<Uuid, GatewayError>,
    },

    /// The caller waiting on `ticket` will never get a result
    AbandonOperation { ticket: OperationTicket },

    /// Drop cached views of every model except this one
    RetainViews { model_id: Option<Uuid> },

    /// Notify connected clients
    NotifyClient { event_type: String, data: Value },
}

impl Effect {
    /// Clients re-read the snapshot on this notification
    pub fn notify_state_change(phase: &str) -> Self {
        Effect::NotifyClient {
            event_type: "state_change".to_string(),
            data: serde_json::json!({ "phase": phase }),
        }
    }

    pub fn notify_error(message: impl Into<String>) -> Self {
        Effect::NotifyClient {
            event_type: "error".to_string(),
            data: serde_json::json!({ "message": message.into() }),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Effect::NotifyClient {
            event_type: "notice".to_string(),
            data: serde_json::json!({ "message": message.into() }),
        }
    }
}
