//! Fetcher contract and HTTP implementation
//!
//! This module handles the network side of one work item:
//! - The [`Fetcher`] trait consumed by the worker pool
//! - Building the HTTP client with browser-like headers
//! - GET requests against the tournament information page
//! - Bounded in-call retries of failed attempts
//! - Error classification into transient and terminal failures

use crate::config::FetcherConfig;
use crate::crawler::parser::{parse_details, TournamentDetails};
use crate::state::{FetchError, FetchTrace, WorkItem};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error as StdError;
use std::time::Duration;
use tokio::time::Instant;

/// Message of a page that lacks the details table
pub const NO_DATA_FOUND: &str = "no data found";

/// Performs one network round trip for one work item
///
/// Implementations must be idempotent from the engine's point of view: a
/// transiently failed item is replayed in a later pass.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Structured payload produced on success
    type Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Fetches and extracts the record for `id`
    async fn fetch(&self, id: &WorkItem) -> Result<Self::Record, FetchError>;

    /// Fetches `id` and reports the attempts and time the call took
    ///
    /// The default wraps one [`fetch`](Fetcher::fetch) call as a single
    /// attempt. The worker pool always goes through this method.
    async fn fetch_traced(&self, id: &WorkItem) -> (Result<Self::Record, FetchError>, FetchTrace) {
        let started = Instant::now();
        let result = self.fetch(id).await;
        let error = result.as_ref().err().map(|e| e.message.as_str());
        let trace = FetchTrace::single(started.elapsed(), error);
        (result, trace)
    }

    /// Human-readable name of a record, used in progress logs
    fn label(&self, _record: &Self::Record) -> Option<String> {
        None
    }
}

/// Builds an HTTP client with proper configuration
///
/// Connection reuse is disabled: the source closes connections after each
/// response and reused sockets surface as spurious EOF errors.
///
/// # Example
///
/// ```no_run
/// use tourney_harvest::config::FetcherConfig;
/// use tourney_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(0)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Why a single HTTP attempt failed
enum AttemptFailure {
    /// Worth another attempt within the same call
    Retry(FetchError),

    /// Reported immediately
    Fail(FetchError),
}

/// Fetches tournament details pages over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    endpoint: String,
    id_param: String,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            endpoint: config.endpoint.clone(),
            id_param: config.id_param.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff(),
        })
    }

    /// Backoff before attempt `attempt` (0-based): none, then 1x, 2x, 4x...
    fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.retry_backoff.saturating_mul(factor)
    }

    /// One GET round trip, returning the body of a successful response
    ///
    /// Transient transport errors and non-success statuses are retried;
    /// other transport errors are not.
    async fn get_page(&self, id: &WorkItem) -> Result<String, AttemptFailure> {
        let classify = |error: reqwest::Error| {
            let error = classify_request_error(error);
            if error.is_transient() {
                AttemptFailure::Retry(error)
            } else {
                AttemptFailure::Fail(error)
            }
        };

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[(self.id_param.as_str(), id.as_str())])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure::Retry(FetchError::terminal(format!(
                "HTTP {}",
                status.as_u16()
            ))));
        }

        response.text().await.map_err(classify)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    type Record = TournamentDetails;

    async fn fetch(&self, id: &WorkItem) -> Result<TournamentDetails, FetchError> {
        self.fetch_traced(id).await.0
    }

    /// Makes up to `max_attempts` HTTP attempts with exponential backoff
    ///
    /// When every attempt failed, the last error keeps its class and its
    /// message is prefixed with `max retries exceeded: `.
    async fn fetch_traced(
        &self,
        id: &WorkItem,
    ) -> (Result<TournamentDetails, FetchError>, FetchTrace) {
        let mut trace = FetchTrace::default();
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            let started = Instant::now();
            if attempt > 0 {
                tokio::time::sleep(self.backoff_before(attempt)).await;
            }
            trace.attempts += 1;

            let page = self.get_page(id).await;
            trace.http += started.elapsed();

            let error = match page {
                Ok(body) => {
                    let started = Instant::now();
                    let details = parse_details(&body);
                    trace.parse += started.elapsed();

                    let result = details.ok_or_else(|| FetchError::terminal(NO_DATA_FOUND));
                    if let Err(e) = &result {
                        trace.attempt_errors.push(e.message.clone());
                    }
                    return (result, trace);
                }
                Err(AttemptFailure::Fail(error)) => {
                    trace.attempt_errors.push(error.message.clone());
                    return (Err(error), trace);
                }
                Err(AttemptFailure::Retry(error)) => error,
            };

            tracing::debug!("Attempt {} for {} failed: {}", attempt + 1, id, error);
            trace.attempt_errors.push(error.message.clone());
            last_error = Some(error);
        }

        let error = match last_error {
            Some(error) if self.max_attempts > 1 => FetchError::new(
                error.class,
                format!("max retries exceeded: {}", error.message),
            ),
            Some(error) => error,
            None => FetchError::terminal("no attempt was made"),
        };
        (Err(error), trace)
    }

    fn label(&self, record: &TournamentDetails) -> Option<String> {
        record.tournament_name.clone()
    }
}

/// Classifies a transport-level error
///
/// | Condition | Class |
/// |-----------|-------|
/// | Deadline expired | TransientTimeout |
/// | Connect / request / body / decode failure | TransientNetwork |
/// | Reset, closed or EOF anywhere in the error chain | TransientNetwork |
/// | Anything else | Terminal |
pub fn classify_request_error(error: reqwest::Error) -> FetchError {
    let message = error_chain_message(&error);

    if error.is_timeout() {
        return FetchError::timeout(format!("timeout: {}", message));
    }

    if error.is_connect()
        || error.is_request()
        || error.is_body()
        || error.is_decode()
        || looks_like_reset(&message)
    {
        return FetchError::network(format!("network error: {}", message));
    }

    FetchError::terminal(message)
}

/// Returns true for messages carrying a reset/EOF signature
pub fn looks_like_reset(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("connection reset")
        || lower.contains("connection closed")
        || lower.contains("broken pipe")
        || lower.contains("eof")
}

/// Joins an error and its sources into one message
fn error_chain_message(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
