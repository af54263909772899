//! Pure state transition function
//!
//! Given the same inputs it always produces the same outputs; gateway calls,
//! replies and notifications are returned as effects for the runtime.

use super::event::{Event, GenerationInput};
use super::ledger::LedgerEntry;
use super::state::{
    InputMode, OperationKind, OperationTicket, Phase, SessionContext, SessionFailure,
    SessionState,
};
use super::Effect;
use crate::ingest;
use crate::llm::Provider;
use crate::runtime::GatewayError;
use std::sync::Arc;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Bad or missing user input; the state is left untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Process description must not be empty")]
    EmptyDescription,
    #[error("Feedback must not be empty")]
    EmptyFeedback,
    #[error("{provider} needs an API key and a model name")]
    MissingAiConfig { provider: Provider },
    #[error("Input mode is {selected}, but the request is for {requested}")]
    ModeMismatch {
        selected: InputMode,
        requested: InputMode,
    },
    #[error("{0}")]
    InvalidUpload(String),
    #[error("Feedback needs a ready model; the session is {phase}")]
    NotReady { phase: &'static str },
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Session is busy ({phase}); wait for the current operation to finish")]
    Busy { phase: &'static str },
    #[error("No process model available")]
    NoModel,
    #[error("Result for operation {ticket} is stale")]
    StaleResult { ticket: OperationTicket },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

#[allow(clippy::too_many_lines)] // One arm per event, kept together for readability
pub fn transition(
    state: &SessionState,
    _context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // Input mode and view selection
        // ============================================================
        Event::SelectInputMode { mode } => {
            let new_state = SessionState {
                view: state.view,
                epoch: state.epoch + 1,
                ..SessionState::new(mode)
            };
            let mut result = TransitionResult::new(new_state);
            if let Some(ticket) = state.phase.pending_ticket() {
                result = result.with_effect(Effect::AbandonOperation { ticket });
            }
            Ok(result
                .with_effect(Effect::RetainViews { model_id: None })
                .with_effect(Effect::notify_state_change(Phase::Empty.name())))
        }

        Event::SelectView { view } => {
            if state.model.is_none() {
                return Err(TransitionError::NoModel);
            }
            let new_state = SessionState {
                view,
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state))
        }

        // ============================================================
        // Generation
        // ============================================================
        Event::Generate { input } => {
            ensure_idle(state)?;
            validate_input(state.input_mode, &input)?;

            let ticket = state.next_ticket();
            let new_state = SessionState {
                phase: Phase::Generating { ticket },
                next_seq: state.next_seq + 1,
                last_error: None,
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::RunGeneration { ticket, input })
                .with_effect(Effect::notify_state_change("generating")))
        }

        Event::GenerationSucceeded { ticket, model } => {
            ensure_pending(state, ticket, OperationKind::Generate)?;

            let model = Arc::new(model);
            let model_id = model.id;
            let mut new_state = SessionState {
                phase: Phase::Ready,
                model: Some(model),
                last_error: None,
                ..state.clone()
            };
            new_state.ledger.clear();
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::RetainViews {
                    model_id: Some(model_id),
                })
                .with_effect(Effect::ResolveOperation {
                    ticket,
                    outcome: Ok(model_id),
                })
                .with_effect(Effect::notify_state_change("ready")))
        }

        Event::GenerationFailed { ticket, error } => {
            ensure_pending(state, ticket, OperationKind::Generate)?;
            Ok(failed(state, ticket, OperationKind::Generate, error))
        }

        // ============================================================
        // Feedback
        // ============================================================
        Event::ApplyFeedback { text, ai } => {
            ensure_idle(state)?;
            let Some(model) = state.model.clone() else {
                return Err(TransitionError::NoModel);
            };
            if state.phase != Phase::Ready {
                return Err(ValidationError::NotReady {
                    phase: state.phase.name(),
                }
                .into());
            }
            let feedback = text.trim().to_string();
            if feedback.is_empty() {
                return Err(ValidationError::EmptyFeedback.into());
            }
            if !ai.is_complete() {
                return Err(ValidationError::MissingAiConfig {
                    provider: ai.provider,
                }
                .into());
            }

            let ticket = state.next_ticket();
            let new_state = SessionState {
                phase: Phase::Updating {
                    ticket,
                    feedback: feedback.clone(),
                },
                next_seq: state.next_seq + 1,
                last_error: None,
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::RunUpdate {
                    ticket,
                    model,
                    feedback,
                    ai,
                })
                .with_effect(Effect::notify_state_change("updating")))
        }

        Event::UpdateSucceeded { ticket, model } => {
            let feedback = match &state.phase {
                Phase::Updating {
                    ticket: pending,
                    feedback,
                } if *pending == ticket => feedback.clone(),
                _ => return Err(TransitionError::StaleResult { ticket }),
            };
            let Some(previous) = state.model.as_deref() else {
                return Err(TransitionError::InvalidTransition(
                    "update completed without a model".to_string(),
                ));
            };

            let entry = LedgerEntry::new(feedback, previous, &model);
            let model = Arc::new(model);
            let model_id = model.id;
            let mut new_state = SessionState {
                phase: Phase::Ready,
                model: Some(model),
                last_error: None,
                ..state.clone()
            };
            new_state.ledger.append(entry);
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::RetainViews {
                    model_id: Some(model_id),
                })
                .with_effect(Effect::ResolveOperation {
                    ticket,
                    outcome: Ok(model_id),
                })
                .with_effect(Effect::notify_state_change("ready")))
        }

        Event::UpdateFailed { ticket, error } => {
            ensure_pending(state, ticket, OperationKind::Update)?;
            Ok(failed(state, ticket, OperationKind::Update, error))
        }

        // ============================================================
        // Error recovery
        // ============================================================
        Event::DismissError => {
            if state.phase != Phase::Failed {
                return Err(TransitionError::InvalidTransition(format!(
                    "nothing to dismiss while {}",
                    state.phase.name()
                )));
            }
            let phase = if state.model.is_some() {
                Phase::Ready
            } else {
                Phase::Empty
            };
            let name = phase.name();
            let new_state = SessionState {
                phase,
                last_error: None,
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state).with_effect(Effect::notify_state_change(name)))
        }
    }
}

fn ensure_idle(state: &SessionState) -> Result<(), TransitionError> {
    if state.phase.is_busy() {
        return Err(TransitionError::Busy {
            phase: state.phase.name(),
        });
    }
    Ok(())
}

fn ensure_pending(
    state: &SessionState,
    ticket: OperationTicket,
    kind: OperationKind,
) -> Result<(), TransitionError> {
    let matches = match (&state.phase, kind) {
        (Phase::Generating { ticket: pending }, OperationKind::Generate)
        | (Phase::Updating {
            ticket: pending, ..
        }, OperationKind::Update) => *pending == ticket,
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(TransitionError::StaleResult { ticket })
    }
}

/// Failure keeps the model and the ledger as they were
fn failed(
    state: &SessionState,
    ticket: OperationTicket,
    operation: OperationKind,
    error: GatewayError,
) -> TransitionResult {
    let new_state = SessionState {
        phase: Phase::Failed,
        last_error: Some(SessionFailure {
            operation,
            kind: error.kind,
            message: error.message.clone(),
        }),
        ..state.clone()
    };
    TransitionResult::new(new_state)
        .with_effect(Effect::ResolveOperation {
            ticket,
            outcome: Err(error.clone()),
        })
        .with_effect(Effect::notify_error(error.message))
        .with_effect(Effect::notify_state_change("failed"))
}

fn validate_input(selected: InputMode, input: &GenerationInput) -> Result<(), ValidationError> {
    if input.mode() != selected {
        return Err(ValidationError::ModeMismatch {
            selected,
            requested: input.mode(),
        });
    }
    match input {
        GenerationInput::Text { description, ai } => {
            if description.trim().is_empty() {
                return Err(ValidationError::EmptyDescription);
            }
            if !ai.is_complete() {
                return Err(ValidationError::MissingAiConfig {
                    provider: ai.provider,
                });
            }
        }
        GenerationInput::EventLog { file_name, content } => {
            ingest::validate_log_upload(file_name, content)
                .map_err(|e| ValidationError::InvalidUpload(e.to_string()))?;
        }
        GenerationInput::ExistingModel { file_name, content } => {
            ingest::validate_model_upload(file_name, content)
                .map_err(|e| ValidationError::InvalidUpload(e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ViewType;
    use crate::llm::AiConfig;
    use crate::process::{CanonicalModel, ModelOrigin, ProcessTree};
    use crate::runtime::GatewayErrorKind;
    use uuid::Uuid;

    fn ctx() -> SessionContext {
        SessionContext::new(Uuid::new_v4())
    }

    fn ai() -> AiConfig {
        AiConfig {
            provider: Provider::Google,
            model_name: "gemini-2.5-pro".to_string(),
            api_key: "key".to_string(),
        }
    }

    fn text_input(description: &str) -> GenerationInput {
        GenerationInput::Text {
            description: description.to_string(),
            ai: ai(),
        }
    }

    fn model(label: &str) -> CanonicalModel {
        CanonicalModel::new(
            ProcessTree::activity(label),
            ModelOrigin::Text {
                description: label.to_string(),
            },
        )
        .unwrap()
    }

    fn ready_state() -> SessionState {
        let state = SessionState::new(InputMode::Text);
        let generating = transition(&state, &ctx(), Event::Generate {
            input: text_input("approve then reject"),
        })
        .unwrap()
        .new_state;
        let ticket = generating.phase.pending_ticket().unwrap();
        transition(&generating, &ctx(), Event::GenerationSucceeded {
            ticket,
            model: model("approve"),
        })
        .unwrap()
        .new_state
    }

    #[test]
    fn test_generate_dispatches_with_ticket() {
        let state = SessionState::new(InputMode::Text);
        let result = transition(&state, &ctx(), Event::Generate {
            input: text_input("approve then reject"),
        })
        .unwrap();

        let expected = OperationTicket { epoch: 0, seq: 0 };
        assert_eq!(result.new_state.phase, Phase::Generating { ticket: expected });
        assert_eq!(result.new_state.next_seq, 1);
        assert!(matches!(
            result.effects[0],
            Effect::RunGeneration { ticket, .. } if ticket == expected
        ));
    }

    #[test]
    fn test_generate_success_installs_model_and_clears_ledger() {
        let state = ready_state();
        assert_eq!(state.phase, Phase::Ready);
        assert!(state.model.is_some());
        assert!(state.ledger.is_empty());
    }

    #[test]
    fn test_validation_rejects_without_state_change() {
        let state = SessionState::new(InputMode::Text);
        let err = transition(&state, &ctx(), Event::Generate {
            input: text_input("   "),
        })
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyDescription.into());

        let mut incomplete = ai();
        incomplete.api_key.clear();
        let err = transition(&state, &ctx(), Event::Generate {
            input: GenerationInput::Text {
                description: "approve".to_string(),
                ai: incomplete,
            },
        })
        .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Validation(ValidationError::MissingAiConfig { .. })
        ));
    }

    #[test]
    fn test_upload_validation() {
        let state = SessionState::new(InputMode::EventLog);
        let wrong_ext = transition(&state, &ctx(), Event::Generate {
            input: GenerationInput::EventLog {
                file_name: "log.csv".to_string(),
                content: b"case,activity".to_vec(),
            },
        });
        assert!(matches!(
            wrong_ext,
            Err(TransitionError::Validation(ValidationError::InvalidUpload(_)))
        ));

        let empty = transition(&state, &ctx(), Event::Generate {
            input: GenerationInput::EventLog {
                file_name: "log.xes".to_string(),
                content: Vec::new(),
            },
        });
        assert!(matches!(
            empty,
            Err(TransitionError::Validation(ValidationError::InvalidUpload(_)))
        ));

        let mismatch = transition(&state, &ctx(), Event::Generate {
            input: text_input("approve"),
        });
        assert!(matches!(
            mismatch,
            Err(TransitionError::Validation(ValidationError::ModeMismatch { .. }))
        ));
    }

    #[test]
    fn test_feedback_success_appends_ledger() {
        let state = ready_state();
        let updating = transition(&state, &ctx(), Event::ApplyFeedback {
            text: "skip the reject step".to_string(),
            ai: ai(),
        })
        .unwrap()
        .new_state;
        let ticket = updating.phase.pending_ticket().unwrap();

        let previous = state.model.as_deref().unwrap();
        let revised = previous.derive(ProcessTree::activity("approve")).unwrap();
        let done = transition(&updating, &ctx(), Event::UpdateSucceeded {
            ticket,
            model: revised.clone(),
        })
        .unwrap()
        .new_state;

        assert_eq!(done.phase, Phase::Ready);
        assert_eq!(done.ledger.all(), vec!["skip the reject step"]);
        assert_eq!(done.model_id(), Some(revised.id));
    }

    #[test]
    fn test_feedback_failure_keeps_model() {
        let state = ready_state();
        let updating = transition(&state, &ctx(), Event::ApplyFeedback {
            text: "add a review".to_string(),
            ai: ai(),
        })
        .unwrap()
        .new_state;
        let ticket = updating.phase.pending_ticket().unwrap();

        let result = transition(&updating, &ctx(), Event::UpdateFailed {
            ticket,
            error: GatewayError::new(GatewayErrorKind::Network, "connection reset"),
        })
        .unwrap();
        let failed = result.new_state;

        assert_eq!(failed.phase, Phase::Failed);
        assert!(Arc::ptr_eq(
            failed.model.as_ref().unwrap(),
            state.model.as_ref().unwrap()
        ));
        assert!(failed.ledger.is_empty());
        assert_eq!(failed.last_error.unwrap().operation, OperationKind::Update);

        // Nothing to dismiss while the update is still running
        let err = transition(&updating, &ctx(), Event::DismissError).unwrap_err();
        assert!(matches!(err, TransitionError::InvalidTransition(_)));
    }

    #[test]
    fn test_feedback_refused_when_failed() {
        let mut state = ready_state();
        state.phase = Phase::Failed;
        let err = transition(&state, &ctx(), Event::ApplyFeedback {
            text: "add a review".to_string(),
            ai: ai(),
        })
        .unwrap_err();
        assert_eq!(err, ValidationError::NotReady { phase: "failed" }.into());

        let recovered = transition(&state, &ctx(), Event::DismissError)
            .unwrap()
            .new_state;
        assert_eq!(recovered.phase, Phase::Ready);
    }

    #[test]
    fn test_feedback_without_model() {
        let state = SessionState::new(InputMode::Text);
        let err = transition(&state, &ctx(), Event::ApplyFeedback {
            text: "add a review".to_string(),
            ai: ai(),
        })
        .unwrap_err();
        assert_eq!(err, TransitionError::NoModel);
    }

    #[test]
    fn test_busy_rejects_generate_and_feedback() {
        let state = ready_state();
        let updating = transition(&state, &ctx(), Event::ApplyFeedback {
            text: "add a review".to_string(),
            ai: ai(),
        })
        .unwrap()
        .new_state;

        let err = transition(&updating, &ctx(), Event::Generate {
            input: text_input("again"),
        })
        .unwrap_err();
        assert_eq!(err, TransitionError::Busy { phase: "updating" });

        // Views stay available while busy
        let viewed = transition(&updating, &ctx(), Event::SelectView {
            view: ViewType::PetriNet,
        })
        .unwrap()
        .new_state;
        assert_eq!(viewed.view, ViewType::PetriNet);
        assert_eq!(viewed.phase, updating.phase);
    }

    #[test]
    fn test_mode_switch_abandons_pending_and_discards_result() {
        let state = SessionState::new(InputMode::Text);
        let generating = transition(&state, &ctx(), Event::Generate {
            input: text_input("approve"),
        })
        .unwrap()
        .new_state;
        let ticket = generating.phase.pending_ticket().unwrap();

        let switched = transition(&generating, &ctx(), Event::SelectInputMode {
            mode: InputMode::EventLog,
        })
        .unwrap();
        assert!(matches!(
            switched.effects[0],
            Effect::AbandonOperation { ticket: t } if t == ticket
        ));
        let switched = switched.new_state;
        assert_eq!(switched.phase, Phase::Empty);
        assert_eq!(switched.epoch, 1);

        let err = transition(&switched, &ctx(), Event::GenerationSucceeded {
            ticket,
            model: model("late"),
        })
        .unwrap_err();
        assert_eq!(err, TransitionError::StaleResult { ticket });
    }

    #[test]
    fn test_generate_failure_preserves_prior_model() {
        let state = ready_state();
        let generating = transition(&state, &ctx(), Event::Generate {
            input: text_input("something else"),
        })
        .unwrap()
        .new_state;
        let ticket = generating.phase.pending_ticket().unwrap();

        let failed = transition(&generating, &ctx(), Event::GenerationFailed {
            ticket,
            error: GatewayError::new(GatewayErrorKind::MalformedResponse, "no JSON"),
        })
        .unwrap()
        .new_state;

        assert_eq!(failed.phase, Phase::Failed);
        assert_eq!(failed.model_id(), state.model_id());
    }

    #[test]
    fn test_select_view_needs_model() {
        let state = SessionState::new(InputMode::Text);
        let err = transition(&state, &ctx(), Event::SelectView {
            view: ViewType::Bpmn,
        })
        .unwrap_err();
        assert_eq!(err, TransitionError::NoModel);
    }
}
