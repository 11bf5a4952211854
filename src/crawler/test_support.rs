//! In-memory fetcher with scripted responses for unit tests

use crate::crawler::Fetcher;
use crate::state::{FetchError, WorkItem};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Replays scripted results per id; unscripted calls succeed
#[derive(Debug, Default)]
pub(crate) struct ScriptedFetcher {
    script: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    calls: Mutex<Vec<WorkItem>>,
    delay: Duration,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues results returned by successive fetches of `id`
    pub(crate) fn script(self, id: &str, results: Vec<Result<String, FetchError>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(id.to_string(), results.into());
        self
    }

    pub(crate) fn calls_for(&self, id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == id)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    type Record = String;

    async fn fetch(&self, id: &WorkItem) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(id.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(id.as_str())
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(format!("record {}", id)))
    }

    fn label(&self, record: &String) -> Option<String> {
        Some(record.clone())
    }
}
