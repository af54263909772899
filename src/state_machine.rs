//! Core session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod ledger;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{Event, GenerationInput};
pub use state::{InputMode, OperationTicket, SessionContext, SessionState};
pub use transition::{transition, TransitionError, ValidationError};
