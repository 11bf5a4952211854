//! Output module for results, checkpoints and run summaries
//!
//! This module handles:
//! - Accumulating outcomes and tracking progress
//! - Writing periodic checkpoints and the final output
//! - Summarizing a finished run, with optional attempt and timing diagnostics

mod aggregator;
mod checkpoint;
mod diagnostics;
pub mod stats;

pub use aggregator::{estimate_remaining, Aggregator, ProgressSnapshot};
pub use checkpoint::{load_checkpoint, CheckpointError, CheckpointManager};
pub use diagnostics::FetchDiagnostics;
pub use stats::{error_breakdown, format_duration, log_summary, RunReport};
