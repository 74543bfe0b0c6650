//! Session lifecycle and the periodic evaluation loop.

pub mod evaluator;
pub mod runner;
pub mod state;

pub use evaluator::{Evaluator, ReferenceSource, TickOutcome, TickReport};
pub use runner::{Session, SessionOutputs};
pub use state::{AdvanceOutcome, AdvancePolicy, SessionMachine, SessionState, TransitionError};
