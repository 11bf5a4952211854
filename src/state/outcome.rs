//! Work items, per-attempt outcomes and the error taxonomy
//!
//! An [`Outcome`] is produced by a worker after exactly one fetch attempt and
//! is immutable afterwards. The engine never rewrites or removes outcomes; a
//! work item retried across passes therefore appears once per attempt.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// An opaque identifier naming one unit of remote work
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(String);

impl WorkItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItem {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkItem {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connection reset, premature close, EOF
    TransientNetwork,

    /// No response within the fetch deadline
    TransientTimeout,

    /// Non-success HTTP status or a page missing its expected structure
    Terminal,
}

impl ErrorClass {
    /// Returns true if the failure is eligible for a later retry pass
    ///
    /// Transient failures also feed the rate limiter's error streak.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork | Self::TransientTimeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::TransientTimeout => "transient_timeout",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified per-item fetch failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct FetchError {
    pub class: ErrorClass,
    pub message: String,
}

impl FetchError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TransientNetwork, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TransientTimeout, message)
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Terminal, message)
    }

    pub fn is_transient(&self) -> bool {
        self.class.is_transient()
    }
}

/// The terminal result of one fetch attempt for one work item
///
/// This is also the persisted shape of checkpoint and output entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct Outcome<R> {
    pub id: WorkItem,

    pub success: bool,

    /// Pass number that produced this outcome (0 for the initial pass)
    pub pass: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<R>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchError>,
}

impl<R> Outcome<R> {
    pub fn success(id: WorkItem, pass: u32, record: R) -> Self {
        Self {
            id,
            success: true,
            pass,
            record: Some(record),
            error: None,
        }
    }

    pub fn failure(id: WorkItem, pass: u32, error: FetchError) -> Self {
        Self {
            id,
            success: false,
            pass,
            record: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: WorkItem, pass: u32, result: Result<R, FetchError>) -> Self {
        match result {
            Ok(record) => Self::success(id, pass, record),
            Err(error) => Self::failure(id, pass, error),
        }
    }

    /// Error class of a failed outcome, `None` on success
    pub fn error_class(&self) -> Option<ErrorClass> {
        self.error.as_ref().map(|e| e.class)
    }

    /// Returns true if this outcome makes its item eligible for another pass
    pub fn is_retryable(&self) -> bool {
        !self.success && self.error_class().is_some_and(|c| c.is_transient())
    }
}

/// Reduces an outcome sequence to the latest outcome per work item
///
/// The engine keeps every attempt in its output. Consumers that only want
/// the last-known status of each item can apply this helper; the returned
/// order follows each id's first appearance.
pub fn latest_by_id<R: Clone>(outcomes: &[Outcome<R>]) -> Vec<Outcome<R>> {
    let mut order: Vec<&WorkItem> = Vec::new();
    let mut latest: HashMap<&WorkItem, &Outcome<R>> = HashMap::new();

    for outcome in outcomes {
        if latest.insert(&outcome.id, outcome).is_none() {
            order.push(&outcome.id);
        }
    }

    order
        .into_iter()
        .filter_map(|id| latest.get(id).map(|o| (*o).clone()))
        .collect()
}
