use chrono::NaiveDate;
use mockito::{Matcher, Server};
use serde_json::json;

use bounty_prediction_engine::api_football::ApiFootballClient;
use bounty_prediction_engine::config::{FeedConfig, PushConfig};
use bounty_prediction_engine::feed::{FeedError, FixtureFeed};
use bounty_prediction_engine::metrics::MetricsCollector;
use bounty_prediction_engine::push::{ParsePushDispatcher, PushDispatcher, PushError};

const FIXTURES_BODY: &str = r#"{
    "get": "fixtures",
    "errors": [],
    "results": 2,
    "response": [
        {
            "fixture": {"id": 1035037, "timestamp": 1723903200, "date": "2024-08-17T14:00:00+00:00",
                        "status": {"long": "Not Started", "short": "NS", "elapsed": null}},
            "teams": {"home": {"name": "Arsenal", "logo": null}, "away": {"name": "Wolves", "logo": null}},
            "goals": {"home": null, "away": null}
        },
        {
            "fixture": {"id": 1035038, "timestamp": 1723910400, "date": "2024-08-17T16:00:00+00:00",
                        "status": {"long": "Match Postponed", "short": "PST", "elapsed": null}},
            "teams": {"home": {"name": "Everton", "logo": null}, "away": {"name": "Brighton", "logo": null}},
            "goals": {"home": null, "away": null}
        }
    ]
}"#;

fn client_for(server: &Server, metrics: MetricsCollector) -> ApiFootballClient {
    let config = FeedConfig {
        base_url: server.url(),
        api_host: "v3.football.api-sports.io".to_string(),
        api_key: "test-key".to_string(),
        season: 2024,
        request_timeout_secs: 5,
        requests_per_second: 50,
    };
    ApiFootballClient::new(&config, metrics).unwrap()
}

#[tokio::test]
async fn fixtures_for_league_sends_season_window_and_credentials() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fixtures")
        .match_header("x-rapidapi-key", "test-key")
        .match_header("x-rapidapi-host", "v3.football.api-sports.io")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("league".into(), "39".into()),
            Matcher::UrlEncoded("season".into(), "2024".into()),
            Matcher::UrlEncoded("from".into(), "2024-08-17".into()),
            Matcher::UrlEncoded("to".into(), "2024-08-17".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(FIXTURES_BODY)
        .create_async()
        .await;

    let metrics = MetricsCollector::new();
    let client = client_for(&server, metrics.clone());
    let date = NaiveDate::from_ymd_opt(2024, 8, 17).unwrap();
    let fixtures = client.fixtures_for_league(39, date).await.unwrap();

    mock.assert_async().await;
    assert_eq!(fixtures.len(), 2);
    assert_eq!(fixtures[0].match_id(), 1035037);
    assert_eq!(fixtures[1].status_short(), "PST");

    let stats = metrics.get_metrics();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.successful_requests, 1);
}

#[tokio::test]
async fn live_fixtures_joins_league_ids_into_one_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/fixtures")
        .match_query(Matcher::UrlEncoded("live".into(), "39-140-78".into()))
        .with_status(200)
        .with_body(r#"{"errors": [], "response": []}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server, MetricsCollector::new());
    assert!(client.live_fixtures(&[39, 140, 78]).await.unwrap().is_empty());
    assert!(client.live_fixtures(&[]).await.unwrap().is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn fixture_by_id_returns_none_when_missing() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/fixtures")
        .match_query(Matcher::UrlEncoded("id".into(), "42".into()))
        .with_status(200)
        .with_body(r#"{"errors": [], "response": []}"#)
        .create_async()
        .await;

    let client = client_for(&server, MetricsCollector::new());
    assert!(client.fixture(42).await.unwrap().is_none());
}

#[tokio::test]
async fn errors_field_is_reported_as_rejection() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/fixtures")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"errors": {"token": "Error/Missing application key"}, "response": []}"#)
        .create_async()
        .await;

    let metrics = MetricsCollector::new();
    let client = client_for(&server, metrics.clone());
    let err = client.fixture(1).await.unwrap_err();
    assert!(matches!(&err, FeedError::Rejected(message) if message.contains("Missing application key")));

    let stats = metrics.get_metrics();
    assert_eq!(stats.failed_requests, 1);
    assert!(stats.last_error.is_some());
}

#[tokio::test]
async fn server_errors_surface_the_status() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/fixtures")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let client = client_for(&server, MetricsCollector::new());
    let date = NaiveDate::from_ymd_opt(2024, 8, 17).unwrap();
    assert!(matches!(
        client.fixtures_for_league(39, date).await,
        Err(FeedError::Status(500))
    ));
}

#[tokio::test]
async fn zero_rate_limit_is_rejected() {
    let config = FeedConfig {
        requests_per_second: 0,
        ..FeedConfig::default()
    };
    assert!(matches!(
        ApiFootballClient::new(&config, MetricsCollector::new()),
        Err(FeedError::InvalidRateLimit(0))
    ));
}

#[tokio::test]
async fn push_dispatcher_targets_the_users_installations() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/push")
        .match_header("X-Parse-Application-Id", "app")
        .match_header("X-Parse-Master-Key", "master")
        .match_body(Matcher::Json(json!({
            "where": {"userId": "7"},
            "data": {"alert": "You earned 4 points from the match between Arsenal - Wolves"}
        })))
        .with_status(200)
        .with_body(r#"{"result": true}"#)
        .create_async()
        .await;

    let config = PushConfig {
        server_url: Some(server.url()),
        application_id: "app".to_string(),
        master_key: "master".to_string(),
    };
    let push = ParsePushDispatcher::new(&server.url(), &config).unwrap();
    push.send(7, "You earned 4 points from the match between Arsenal - Wolves")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn push_dispatcher_reports_rejections() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/push")
        .with_status(403)
        .with_body("unauthorized")
        .create_async()
        .await;

    let push = ParsePushDispatcher::new(&server.url(), &PushConfig::default()).unwrap();
    let err = push.send(7, "hello").await.unwrap_err();
    assert!(matches!(err, PushError::Rejected { status: 403, .. }));
}
