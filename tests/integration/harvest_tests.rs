//! End-to-end harvest scenarios

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tourney_harvest::config::Config;
use tourney_harvest::crawler::{harvest, Fetcher, Harvester, RunSettings, TournamentDetails};
use tourney_harvest::output::load_checkpoint;
use tourney_harvest::state::{ErrorClass, FetchError, Outcome, WorkItem};
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fetcher replaying a per-id script; unscripted fetches succeed
#[derive(Default)]
struct ScriptedFetcher {
    script: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    /// Checkpoint file inspected on every fetch
    watch: Option<PathBuf>,
    snapshots: Arc<Mutex<Vec<Vec<Outcome<String>>>>>,
}

impl ScriptedFetcher {
    fn script(self, id: &str, results: Vec<Result<String, FetchError>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(id.to_string(), results.into());
        self
    }

    fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    type Record = String;

    async fn fetch(&self, id: &WorkItem) -> Result<String, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default() += 1;

        if let Some(path) = &self.watch {
            if path.exists() {
                let snapshot: Vec<Outcome<String>> =
                    load_checkpoint(path).expect("checkpoint must always parse");
                self.snapshots.lock().unwrap().push(snapshot);
            }
        }

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(id.as_str())
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(format!("details of {}", id)))
    }
}

fn ids(n: usize) -> Vec<WorkItem> {
    (0..n).map(|i| WorkItem::new(format!("3680{:02}", i))).collect()
}

fn settings(dir: &TempDir, concurrency: usize, initial_rate: f64, max_retry_passes: u32) -> RunSettings {
    RunSettings {
        concurrency,
        initial_rate,
        max_retry_passes,
        base_delay: Duration::from_secs(3),
        checkpoint_interval: 0,
        checkpoint_suffix: ".checkpoint".to_string(),
        output: Some(dir.path().join("details.json")),
        progress_every: 50,
        show_timing: false,
        verbose_errors: false,
        profile: false,
    }
}

fn write_id_file(dir: &TempDir, ids: &[&str]) -> PathBuf {
    let path = dir.path().join("ids");
    let mut file = std::fs::File::create(&path).unwrap();
    for id in ids {
        writeln!(file, "{}", id).unwrap();
    }
    path
}

#[tokio::test(start_paused = true)]
async fn test_scenario_all_succeed() {
    let dir = TempDir::new().unwrap();
    let harvester = Harvester::new(settings(&dir, 3, 2.0, 3), ScriptedFetcher::default());

    let result = harvester
        .run(ids(10), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.report.passes_executed, 1);
    assert_eq!(result.report.success_count, 10);
    assert_eq!(result.report.retried_items, 0);

    let output: Vec<Outcome<String>> = load_checkpoint(&dir.path().join("details.json")).unwrap();
    assert_eq!(output.len(), 10);
    assert!(output.iter().all(|o| o.success && o.pass == 0));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_timeouts_recovered_in_second_pass() {
    let dir = TempDir::new().unwrap();
    let mut fetcher = ScriptedFetcher::default();
    for id in ids(5) {
        fetcher = fetcher.script(id.as_str(), vec![Err(FetchError::timeout("timeout"))]);
    }
    let harvester = Harvester::new(settings(&dir, 3, 2.0, 1), fetcher);

    let result = harvester
        .run(ids(5), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.report.passes_executed, 2);
    assert_eq!(result.report.retried_items, 5);
    assert!(result.report.permanent_failures.is_empty());

    let output: Vec<Outcome<String>> = load_checkpoint(&dir.path().join("details.json")).unwrap();
    // Both attempts are kept for every id
    assert_eq!(output.len(), 10);
    let successes: Vec<&Outcome<String>> = output.iter().filter(|o| o.success).collect();
    let failures: Vec<&Outcome<String>> = output.iter().filter(|o| !o.success).collect();
    assert_eq!(successes.len(), 5);
    assert!(successes.iter().all(|o| o.pass == 1));
    assert_eq!(failures.len(), 5);
    assert!(failures
        .iter()
        .all(|o| o.pass == 0 && o.error_class() == Some(ErrorClass::TransientTimeout)));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_terminal_failure_never_retried() {
    let dir = TempDir::new().unwrap();
    let fetcher =
        ScriptedFetcher::default().script("368001", vec![Err(FetchError::terminal("HTTP 404"))]);
    let fetcher = Arc::new(fetcher);
    let harvester = Harvester::new(
        settings(&dir, 3, 2.0, 2),
        ForwardingFetcher(Arc::clone(&fetcher)),
    );

    let result = harvester
        .run(ids(3), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.report.passes_executed, 1);
    assert_eq!(result.report.success_count, 2);
    assert_eq!(result.report.error_count, 1);
    assert_eq!(result.report.permanent_failures, vec![WorkItem::from("368001")]);
    assert_eq!(fetcher.calls_for("368001"), 1);

    let output: Vec<Outcome<String>> = load_checkpoint(&dir.path().join("details.json")).unwrap();
    assert_eq!(output.len(), 3);
    let failed: Vec<&Outcome<String>> = output.iter().filter(|o| !o.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id.as_str(), "368001");
    assert_eq!(failed[0].error_class(), Some(ErrorClass::Terminal));
}

#[tokio::test(start_paused = true)]
async fn test_scenario_checkpoints_are_valid_prefixes() {
    let dir = TempDir::new().unwrap();
    // One worker at a low rate: every acquire sleeps, letting each outcome
    // be recorded before the next fetch starts
    let mut run_settings = settings(&dir, 1, 1.0, 0);
    run_settings.checkpoint_interval = 2;
    let checkpoint_path = dir.path().join("details.json.checkpoint");

    let fetcher = ScriptedFetcher {
        watch: Some(checkpoint_path.clone()),
        ..ScriptedFetcher::default()
    };
    let snapshots = Arc::clone(&fetcher.snapshots);
    let harvester = Harvester::new(run_settings, fetcher);

    let result = harvester
        .run(ids(6), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.report.checkpoints_written, 3);

    let output: Vec<Outcome<String>> = load_checkpoint(&dir.path().join("details.json")).unwrap();
    assert_eq!(output.len(), 6);

    // Fetches 3..=6 observed the checkpoints written after successes 2 and 4
    let snapshots = snapshots.lock().unwrap();
    let distinct: Vec<usize> = {
        let mut lengths: Vec<usize> = snapshots.iter().map(Vec::len).collect();
        lengths.dedup();
        lengths
    };
    assert_eq!(distinct, vec![2, 4]);
    for snapshot in snapshots.iter() {
        assert!(snapshot.len() <= output.len());
        assert_eq!(snapshot.as_slice(), &output[..snapshot.len()]);
    }

    // The last checkpoint holds every outcome
    let last: Vec<Outcome<String>> = load_checkpoint(&checkpoint_path).unwrap();
    assert_eq!(last, output);
}

#[tokio::test]
async fn test_harvest_from_config_against_mock_server() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("event", "368001"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<table class="details_table">
                <tr><td class="info_table_l">Tournament Name</td><td>Tromso Cup</td></tr>
                <tr><td class="info_table_l">Country</td><td>NOR</td></tr>
            </table>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("event", "368002"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("event", "368003"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.input.path = Some(write_id_file(&dir, &["368001", "", "368002", "368003", "368004"]));
    config.input.limit = 3;
    config.output.path = Some(dir.path().join("out").join("details.json"));
    config.crawler.initial_rate = 50.0;
    config.crawler.base_delay_secs = 0.0;
    config.fetcher.endpoint = format!("{}/tournament_information.phtml", server.uri());
    config.fetcher.retry_backoff_ms = 10;

    let report = harvest(&config, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.total_input, 3);
    assert_eq!(report.passes_executed, 1);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.error_count, 2);
    // The 404 is retried within the fetch before it is reported
    assert_eq!(
        report.error_breakdown,
        vec![
            ("max retries exceeded: HTTP 404".to_string(), 1),
            ("no data found".to_string(), 1)
        ]
    );
    assert_eq!(
        report.diagnostics.attempt_distribution,
        std::collections::BTreeMap::from([(1, 2), (3, 1)])
    );
    assert_eq!(report.diagnostics.retried_ids, vec![WorkItem::from("368002")]);

    let output: Vec<Outcome<TournamentDetails>> =
        load_checkpoint(&dir.path().join("out").join("details.json")).unwrap();
    assert_eq!(output.len(), 3);
    let found = output.iter().find(|o| o.success).unwrap();
    assert_eq!(found.id.as_str(), "368001");
    let record = found.record.as_ref().unwrap();
    assert_eq!(record.tournament_name.as_deref(), Some("Tromso Cup"));
    assert_eq!(record.country.as_deref(), Some("NOR"));
}

#[tokio::test]
async fn test_harvest_recovers_server_error_within_one_pass() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("event", "368001"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("event", "368001"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<table class="details_table">
                <tr><td class="info_table_l">Tournament Name</td><td>Narvik Open</td></tr>
            </table>"#,
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.input.path = Some(write_id_file(&dir, &["368001"]));
    config.output.path = Some(dir.path().join("details.json"));
    config.crawler.initial_rate = 50.0;
    config.fetcher.endpoint = format!("{}/tournament_information.phtml", server.uri());
    config.fetcher.retry_backoff_ms = 10;

    let report = harvest(&config, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.passes_executed, 1);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.error_count, 0);
    assert_eq!(report.retried_items, 0);
    assert_eq!(report.diagnostics.extra_attempts(), 1);
    assert_eq!(
        report.diagnostics.attempt_error_breakdown(),
        vec![("HTTP 503".to_string(), 1)]
    );

    let output: Vec<Outcome<TournamentDetails>> =
        load_checkpoint(&dir.path().join("details.json")).unwrap();
    assert_eq!(output.len(), 1);
    assert!(output[0].success);
}

#[tokio::test]
async fn test_harvest_rejects_empty_work_list() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.input.path = Some(write_id_file(&dir, &["", "  "]));

    let result = harvest(&config, &CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(tourney_harvest::HarvestError::EmptyInput { .. })
    ));
}

/// Lets a test keep a handle on the fetcher the harvester owns
struct ForwardingFetcher(Arc<ScriptedFetcher>);

#[async_trait]
impl Fetcher for ForwardingFetcher {
    type Record = String;

    async fn fetch(&self, id: &WorkItem) -> Result<String, FetchError> {
        self.0.fetch(id).await
    }
}
