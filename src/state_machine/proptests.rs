//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::event::GenerationInput;
use super::state::*;
use super::transition::*;
use super::*;
use crate::convert::ViewType;
use crate::llm::{AiConfig, Provider};
use crate::process::{CanonicalModel, ModelOrigin, ProcessTree};
use crate::runtime::{GatewayError, GatewayErrorKind};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> SessionContext {
    SessionContext::new(Uuid::nil())
}

fn test_ai() -> AiConfig {
    AiConfig {
        provider: Provider::OpenAI,
        model_name: "gpt-4.1".to_string(),
        api_key: "sk-test".to_string(),
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

fn input_for(mode: InputMode) -> GenerationInput {
    match mode {
        InputMode::Text => GenerationInput::Text {
            description: "approve then reject".to_string(),
            ai: test_ai(),
        },
        InputMode::EventLog => GenerationInput::EventLog {
            file_name: "orders.xes".to_string(),
            content: b"<log/>".to_vec(),
        },
        InputMode::ExistingModel => GenerationInput::ExistingModel {
            file_name: "orders.pnml".to_string(),
            content: b"<pnml/>".to_vec(),
        },
    }
}

fn gateway_error() -> GatewayError {
    GatewayError::new(GatewayErrorKind::Network, "connection reset")
}

/// What a user (or the gateway) does next
#[derive(Debug, Clone)]
enum Action {
    Generate { succeed: bool },
    Feedback { text: String, succeed: bool },
    SwitchMode(InputMode),
    SelectView(ViewType),
    Dismiss,
}

/// Applies actions, completing every dispatched operation immediately
struct Driver {
    state: SessionState,
    ctx: SessionContext,
    expected_ledger: Vec<String>,
}

impl Driver {
    fn new() -> Self {
        Self {
            state: SessionState::new(InputMode::Text),
            ctx: test_context(),
            expected_ledger: Vec::new(),
        }
    }

    fn apply(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
        let result = transition(&self.state, &self.ctx, event)?;
        self.state = result.new_state;
        Ok(result.effects)
    }

    fn run(&mut self, action: Action) {
        match action {
            Action::Generate { succeed } => {
                let input = input_for(self.state.input_mode);
                if self.apply(Event::Generate { input }).is_err() {
                    return;
                }
                let ticket = self.state.phase.pending_ticket().unwrap();
                let completion = if succeed {
                    self.expected_ledger.clear();
                    Event::GenerationSucceeded {
                        ticket,
                        model: model("generated"),
                    }
                } else {
                    Event::GenerationFailed {
                        ticket,
                        error: gateway_error(),
                    }
                };
                self.apply(completion).unwrap();
            }
            Action::Feedback { text, succeed } => {
                let before = self.state.model.clone();
                if self
                    .apply(Event::ApplyFeedback {
                        text: text.clone(),
                        ai: test_ai(),
                    })
                    .is_err()
                {
                    return;
                }
                let ticket = self.state.phase.pending_ticket().unwrap();
                let completion = if succeed {
                    self.expected_ledger.push(text.trim().to_string());
                    let revised = before
                        .as_deref()
                        .unwrap()
                        .derive(ProcessTree::activity(text.trim()))
                        .unwrap();
                    Event::UpdateSucceeded {
                        ticket,
                        model: revised,
                    }
                } else {
                    Event::UpdateFailed {
                        ticket,
                        error: gateway_error(),
                    }
                };
                self.apply(completion).unwrap();
            }
            Action::SwitchMode(mode) => {
                self.apply(Event::SelectInputMode { mode }).unwrap();
                self.expected_ledger.clear();
            }
            Action::SelectView(view) => {
                let _ = self.apply(Event::SelectView { view });
            }
            Action::Dismiss => {
                let _ = self.apply(Event::DismissError);
            }
        }
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_mode() -> impl Strategy<Value = InputMode> {
    prop_oneof![
        Just(InputMode::Text),
        Just(InputMode::EventLog),
        Just(InputMode::ExistingModel),
    ]
}

fn arb_view() -> impl Strategy<Value = ViewType> {
    prop_oneof![
        Just(ViewType::ProcessTree),
        Just(ViewType::PetriNet),
        Just(ViewType::Bpmn),
    ]
}

fn arb_feedback() -> impl Strategy<Value = String> {
    "[a-z]{1,12}( [a-z]{1,12}){0,3}"
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => any::<bool>().prop_map(|succeed| Action::Generate { succeed }),
        5 => (arb_feedback(), any::<bool>())
            .prop_map(|(text, succeed)| Action::Feedback { text, succeed }),
        1 => arb_mode().prop_map(Action::SwitchMode),
        1 => arb_view().prop_map(Action::SelectView),
        2 => Just(Action::Dismiss),
    ]
}

fn arb_busy_state() -> impl Strategy<Value = SessionState> {
    (0u64..4, 0u64..10, any::<bool>(), arb_feedback()).prop_map(
        |(epoch, seq, updating, feedback)| {
            let ticket = OperationTicket { epoch, seq };
            let phase = if updating {
                Phase::Updating { ticket, feedback }
            } else {
                Phase::Generating { ticket }
            };
            SessionState {
                phase,
                model: Some(Arc::new(model("current"))),
                epoch,
                next_seq: seq + 1,
                ..SessionState::default()
            }
        },
    )
}

fn arb_state() -> impl Strategy<Value = SessionState> {
    proptest::collection::vec(arb_action(), 0..12).prop_map(|actions| {
        let mut driver = Driver::new();
        for action in actions {
            driver.run(action);
        }
        driver.state
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Ledger holds exactly the successful feedback rounds since the last
    // generation, in order
    #[test]
    fn prop_ledger_matches_successful_updates(actions in proptest::collection::vec(arb_action(), 0..30)) {
        let mut driver = Driver::new();
        for action in actions {
            driver.run(action);
            let recorded: Vec<String> =
                driver.state.ledger.all().into_iter().map(String::from).collect();
            prop_assert_eq!(&recorded, &driver.expected_ledger);
        }
    }

    // A failed feedback round keeps the very same model value and ledger
    #[test]
    fn prop_failed_update_is_non_destructive(
        rounds in proptest::collection::vec(arb_feedback(), 0..5),
        failing in arb_feedback()
    ) {
        let mut driver = Driver::new();
        driver.run(Action::Generate { succeed: true });
        for text in rounds {
            driver.run(Action::Feedback { text, succeed: true });
        }
        let model_before = driver.state.model.clone().unwrap();
        let ledger_before = driver.state.ledger.clone();

        driver.run(Action::Feedback { text: failing, succeed: false });

        prop_assert_eq!(driver.state.phase.clone(), Phase::Failed);
        prop_assert!(Arc::ptr_eq(driver.state.model.as_ref().unwrap(), &model_before));
        prop_assert_eq!(&driver.state.ledger, &ledger_before);
    }

    // Selecting an input mode always resets, whatever came before
    #[test]
    fn prop_select_input_mode_resets(state in arb_state(), mode in arb_mode()) {
        let result = transition(&state, &test_context(), Event::SelectInputMode { mode }).unwrap();
        let new_state = result.new_state;

        prop_assert_eq!(new_state.phase, Phase::Empty);
        prop_assert!(new_state.model.is_none());
        prop_assert!(new_state.ledger.is_empty());
        prop_assert!(new_state.last_error.is_none());
        prop_assert_eq!(new_state.input_mode, mode);
        prop_assert_eq!(new_state.epoch, state.epoch + 1);
        prop_assert_eq!(new_state.view, state.view);
    }

    // No second mutation starts while one is in flight
    #[test]
    fn prop_busy_rejects_mutations(state in arb_busy_state(), text in arb_feedback()) {
        let generate = transition(&state, &test_context(), Event::Generate {
            input: input_for(InputMode::Text),
        });
        prop_assert!(
            matches!(generate, Err(TransitionError::Busy { .. })),
            "expected Busy, got {:?}",
            generate
        );

        let feedback = transition(&state, &test_context(), Event::ApplyFeedback {
            text,
            ai: test_ai(),
        });
        prop_assert!(
            matches!(feedback, Err(TransitionError::Busy { .. })),
            "expected Busy, got {:?}",
            feedback
        );
    }

    // Completions carrying any ticket but the pending one change nothing
    #[test]
    fn prop_mismatched_ticket_is_stale(state in arb_busy_state(), epoch in 0u64..4, seq in 0u64..10) {
        let pending = state.phase.pending_ticket().unwrap();
        let ticket = OperationTicket { epoch, seq };
        prop_assume!(ticket != pending);

        let events = [
            Event::GenerationSucceeded { ticket, model: model("late") },
            Event::GenerationFailed { ticket, error: gateway_error() },
            Event::UpdateSucceeded { ticket, model: model("late") },
            Event::UpdateFailed { ticket, error: gateway_error() },
        ];
        for event in events {
            let result = transition(&state, &test_context(), event);
            prop_assert_eq!(result.err(), Some(TransitionError::StaleResult { ticket }));
        }
    }

    // Successful generation from any idle state lands in Ready with an empty ledger
    #[test]
    fn prop_generate_success_is_ready(state in arb_state()) {
        prop_assume!(!state.phase.is_busy());
        let input = input_for(state.input_mode);
        let generating = transition(&state, &test_context(), Event::Generate { input })
            .unwrap()
            .new_state;
        let ticket = generating.phase.pending_ticket().unwrap();
        let ready = transition(&generating, &test_context(), Event::GenerationSucceeded {
            ticket,
            model: model("fresh"),
        })
        .unwrap()
        .new_state;

        prop_assert_eq!(ready.phase, Phase::Ready);
        prop_assert!(ready.model.is_some());
        prop_assert!(ready.ledger.is_empty());
        prop_assert!(ready.last_error.is_none());
    }

    // Tickets never repeat within a session
    #[test]
    fn prop_tickets_are_unique(actions in proptest::collection::vec(arb_action(), 0..30)) {
        let mut driver = Driver::new();
        let mut seen = std::collections::HashSet::new();
        for action in actions {
            let ticket = driver.state.next_ticket();
            driver.run(action);
            if driver.state.next_ticket() != ticket {
                prop_assert!(seen.insert(ticket), "ticket {} issued twice", ticket);
            }
        }
    }
}
