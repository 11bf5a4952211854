//! HttpFetcher classification against mock HTTP servers

use std::time::Duration;
use tourney_harvest::config::FetcherConfig;
use tourney_harvest::crawler::{Fetcher, HttpFetcher};
use tourney_harvest::state::{ErrorClass, WorkItem};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DETAILS_PAGE: &str = r#"<html><head><title>Tournament</title></head><body>
<table class="details_table">
  <tr><td class="info_table_l">Event code</td><td>368123</td></tr>
  <tr><td class="info_table_l">Tournament Name</td><td>Bergen Spring Open</td></tr>
  <tr><td class="info_table_l">City</td><td>Bergen</td></tr>
  <tr><td class="info_table_l">Chief Arbiter</td><td><a href="/a/1">Kari Nordmann</a></td></tr>
</table>
</body></html>"#;

fn fetcher_config(server: &MockServer) -> FetcherConfig {
    FetcherConfig {
        endpoint: format!("{}/tournament_information.phtml", server.uri()),
        timeout_secs: 1,
        connect_timeout_secs: 1,
        retry_backoff_ms: 10,
        ..FetcherConfig::default()
    }
}

fn single_attempt(server: &MockServer) -> FetcherConfig {
    FetcherConfig {
        max_attempts: 1,
        ..fetcher_config(server)
    }
}

#[tokio::test]
async fn test_fetch_parses_details_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tournament_information.phtml"))
        .and(query_param("event", "368123"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(DETAILS_PAGE)
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fetcher_config(&server)).unwrap();
    let details = fetcher.fetch(&WorkItem::from("368123")).await.unwrap();

    assert_eq!(details.event_code.as_deref(), Some("368123"));
    assert_eq!(details.tournament_name.as_deref(), Some("Bergen Spring Open"));
    assert_eq!(details.city.as_deref(), Some("Bergen"));
    assert_eq!(details.chief_arbiter, vec!["Kari Nordmann"]);
    assert_eq!(fetcher.label(&details).as_deref(), Some("Bergen Spring Open"));
}

#[tokio::test]
async fn test_non_success_status_is_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&single_attempt(&server)).unwrap();
    let error = fetcher.fetch(&WorkItem::from("1")).await.unwrap_err();

    assert_eq!(error.class, ErrorClass::Terminal);
    assert_eq!(error.message, "HTTP 404");
    assert!(!error.is_transient());
}

#[tokio::test]
async fn test_failing_status_exhausts_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fetcher_config(&server)).unwrap();
    let (result, trace) = fetcher.fetch_traced(&WorkItem::from("1")).await;
    let error = result.unwrap_err();

    assert_eq!(error.class, ErrorClass::Terminal);
    assert_eq!(error.message, "max retries exceeded: HTTP 503");
    assert_eq!(trace.attempts, 3);
    assert_eq!(trace.attempt_errors, vec!["HTTP 503"; 3]);
}

#[tokio::test]
async fn test_server_error_then_success_within_one_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("event", "368123"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("event", "368123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DETAILS_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fetcher_config(&server)).unwrap();
    let (result, trace) = fetcher.fetch_traced(&WorkItem::from("368123")).await;

    let details = result.unwrap();
    assert_eq!(details.tournament_name.as_deref(), Some("Bergen Spring Open"));
    assert_eq!(trace.attempts, 2);
    assert_eq!(trace.attempt_errors, vec!["HTTP 503".to_string()]);
    assert!(trace.was_retried());
}

#[tokio::test]
async fn test_page_without_details_is_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><p>Tournament not found</p></body></html>"),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&fetcher_config(&server)).unwrap();
    let (result, trace) = fetcher.fetch_traced(&WorkItem::from("1")).await;
    let error = result.unwrap_err();

    // A page without details is final; no further attempts
    assert_eq!(error.class, ErrorClass::Terminal);
    assert_eq!(error.message, "no data found");
    assert_eq!(trace.attempts, 1);
}

#[tokio::test]
async fn test_slow_response_is_transient_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(DETAILS_PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = FetcherConfig {
        max_attempts: 2,
        ..fetcher_config(&server)
    };
    let fetcher = HttpFetcher::new(&config).unwrap();
    let error = fetcher.fetch(&WorkItem::from("1")).await.unwrap_err();

    // Exhausted attempts keep the class of the last failure
    assert_eq!(error.class, ErrorClass::TransientTimeout);
    assert!(error.message.starts_with("max retries exceeded: timeout"));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_refused_connection_is_transient_network() {
    // Bind and drop a listener to get a local port with nothing behind it
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = FetcherConfig {
        endpoint: format!("http://127.0.0.1:{}/tournament_information.phtml", port),
        timeout_secs: 2,
        connect_timeout_secs: 1,
        ..FetcherConfig::default()
    };

    let fetcher = HttpFetcher::new(&config).unwrap();
    let error = fetcher.fetch(&WorkItem::from("1")).await.unwrap_err();

    assert_eq!(error.class, ErrorClass::TransientNetwork);
}
