//! Events that can occur in a session

use super::state::{InputMode, OperationTicket};
use crate::convert::ViewType;
use crate::llm::AiConfig;
use crate::process::CanonicalModel;
use crate::runtime::GatewayError;
use std::fmt;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    SelectInputMode {
        mode: InputMode,
    },
    SelectView {
        view: ViewType,
    },
    Generate {
        input: GenerationInput,
    },
    ApplyFeedback {
        text: String,
        ai: AiConfig,
    },
    DismissError,

    // Gateway completions
    GenerationSucceeded {
        ticket: OperationTicket,
        model: CanonicalModel,
    },
    GenerationFailed {
        ticket: OperationTicket,
        error: GatewayError,
    },
    UpdateSucceeded {
        ticket: OperationTicket,
        model: CanonicalModel,
    },
    UpdateFailed {
        ticket: OperationTicket,
        error: GatewayError,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::SelectInputMode { .. } => "select_input_mode",
            Event::SelectView { .. } => "select_view",
            Event::Generate { .. } => "generate",
            Event::ApplyFeedback { .. } => "apply_feedback",
            Event::DismissError => "dismiss_error",
            Event::GenerationSucceeded { .. } => "generation_succeeded",
            Event::GenerationFailed { .. } => "generation_failed",
            Event::UpdateSucceeded { .. } => "update_succeeded",
            Event::UpdateFailed { .. } => "update_failed",
        }
    }
}

/// Payload of a generate request, one variant per input mode
#[derive(Clone)]
pub enum GenerationInput {
    Text {
        description: String,
        ai: AiConfig,
    },
    EventLog {
        file_name: String,
        content: Vec<u8>,
    },
    ExistingModel {
        file_name: String,
        content: Vec<u8>,
    },
}

impl GenerationInput {
    pub fn mode(&self) -> InputMode {
        match self {
            GenerationInput::Text { .. } => InputMode::Text,
            GenerationInput::EventLog { .. } => InputMode::EventLog,
            GenerationInput::ExistingModel { .. } => InputMode::ExistingModel,
        }
    }
}

impl fmt::Debug for GenerationInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationInput::Text { description, ai } => f
                .debug_struct("Text")
                .field("description", description)
                .field("ai", ai)
                .finish(),
            GenerationInput::EventLog { file_name, content }
            | GenerationInput::ExistingModel { file_name, content } => f
                .debug_struct(match self.mode() {
                    InputMode::EventLog => "EventLog",
                    _ => "ExistingModel",
                })
                .field("file_name", file_name)
                .field("bytes", &content.len())
                .finish(),
        }
    }
}
