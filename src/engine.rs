//! Production engines behind the model gateway
//!
//! The session controller treats these as opaque: the AI engine turns text
//! and feedback into process trees, discovery turns event logs into process
//! trees, and play-out turns imported models into event logs.

mod ai;
mod discovery;
mod playout;
mod prompt;

pub use ai::AiEngine;
pub use discovery::discover;
pub use playout::{bpmn_to_petri, play_out, PlayoutLimits};
pub use prompt::ExtractError;

use crate::llm::LlmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Model answer unusable after {attempts} attempts: {source}")]
    Malformed {
        attempts: u32,
        #[source]
        source: ExtractError,
    },

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Unsupported model: {0}")]
    Unsupported(String),

    #[error("Play-out failed: {0}")]
    Playout(String),
}
