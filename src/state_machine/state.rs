//! Session state types

use super::ledger::FeedbackLedger;
use crate::convert::ViewType;
use crate::process::CanonicalModel;
use crate::runtime::GatewayErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Where the session takes its input from; switching discards the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    #[default]
    Text,
    EventLog,
    ExistingModel,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::Text => "text",
            InputMode::EventLog => "event_log",
            InputMode::ExistingModel => "existing_model",
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(InputMode::Text),
            "event_log" | "log" => Ok(InputMode::EventLog),
            "existing_model" | "model" => Ok(InputMode::ExistingModel),
            other => Err(format!("Unknown input mode: {other}")),
        }
    }
}

/// Identifies one dispatched gateway operation
///
/// `epoch` changes on every input mode switch; `seq` counts dispatches
/// within an epoch. A completion is applied only if its ticket is the one
/// the session is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationTicket {
    pub epoch: u64,
    pub seq: u64,
}

impl fmt::Display for OperationTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.epoch, self.seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Generate,
    Update,
}

/// Last gateway failure, shown to the user until dismissed or replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFailure {
    pub operation: OperationKind,
    pub kind: GatewayErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    /// No model yet
    #[default]
    Empty,

    /// Generation in flight
    Generating { ticket: OperationTicket },

    /// A model is installed and accepts feedback
    Ready,

    /// Feedback round in flight against the current model
    Updating {
        ticket: OperationTicket,
        feedback: String,
    },

    /// Last gateway call failed; a prior model, if any, is kept
    Failed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Empty => "empty",
            Phase::Generating { .. } => "generating",
            Phase::Ready => "ready",
            Phase::Updating { .. } => "updating",
            Phase::Failed => "failed",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Phase::Generating { .. } | Phase::Updating { .. })
    }

    /// Ticket of the operation this phase waits for
    pub fn pending_ticket(&self) -> Option<OperationTicket> {
        match self {
            Phase::Generating { ticket } | Phase::Updating { ticket, .. } => Some(*ticket),
            _ => None,
        }
    }
}

/// Complete state of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    pub phase: Phase,
    pub input_mode: InputMode,
    pub view: ViewType,
    pub model: Option<Arc<CanonicalModel>>,
    pub ledger: FeedbackLedger,
    pub last_error: Option<SessionFailure>,
    pub epoch: u64,
    pub next_seq: u64,
}

impl SessionState {
    pub fn new(input_mode: InputMode) -> Self {
        Self {
            input_mode,
            ..Self::default()
        }
    }

    /// Ticket for the next dispatch in the current epoch
    pub fn next_ticket(&self) -> OperationTicket {
        OperationTicket {
            epoch: self.epoch,
            seq: self.next_seq,
        }
    }

    pub fn model_id(&self) -> Option<Uuid> {
        self.model.as_ref().map(|m| m.id)
    }
}

/// Immutable configuration of a session
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
}

impl SessionContext {
    pub fn new(session_id: Uuid) -> Self {
        Self { session_id }
    }
}
