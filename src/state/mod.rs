//! State tracking for work items and passes

mod outcome;
mod pass_state;
mod trace;

pub use outcome::{latest_by_id, ErrorClass, FetchError, Outcome, WorkItem};
pub use pass_state::{PassPhase, PassState};
pub use trace::FetchTrace;
