mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;

use bounty_prediction_engine::store::ObjectStore;
use bounty_prediction_engine::types::{Event, EventType, NewPrediction, Outcome, ScorePick};
use bounty_prediction_engine::web::{router, AppState};
use common::{harness, league, stored_match, user, Harness};

fn server_for(h: &Harness) -> TestServer {
    TestServer::new(router(AppState {
        engine: h.engine.clone(),
    }))
    .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let server = server_for(&h);
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

#[tokio::test]
async fn stats_include_job_runs() {
    let h = harness();
    h.engine.run_event_housekeeping(Utc::now()).await;
    let server = server_for(&h);

    let stats = server.get("/stats").await.json::<Value>();
    assert_eq!(stats["feed"]["total_requests"], 0);
    assert_eq!(stats["jobs"][0]["job"], "event-housekeeping");
    assert_eq!(stats["jobs"][0]["status"], "success");
}

#[tokio::test]
async fn leaderboard_is_served_as_json() {
    let h = harness();
    h.store.insert_league(league(39, 10, true));
    h.store.insert_user(user(1, "alice"));
    h.store.insert_user(user(2, "bob"));
    let start = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
    h.store.insert_match(stored_match(1, 39, start + Duration::days(2), "FT"));
    h.store.insert_event_with_id(Event {
        id: 5,
        name: "Friends".to_string(),
        start_time: start,
        end_time: start + Duration::days(30),
        event_type: EventType::Private,
        invite_code: Some("ABC123".to_string()),
        finished: false,
    });
    h.store.add_event_leagues(5, &[39]).await.unwrap();
    h.store.add_event_members(5, &[1, 2]).await.unwrap();
    let prediction = h
        .store
        .insert_prediction(NewPrediction {
            match_id: 1,
            user_id: 2,
            league_id: 39,
            outcome: Outcome::Away,
            score_pick: ScorePick::None,
            created_at: start + Duration::days(1),
        })
        .await
        .unwrap();
    h.store.save_prediction_points(&[(prediction.id, 1)]).await.unwrap();

    let server = server_for(&h);
    let response = server.get("/events/5/leaderboard").await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["event"]["name"], "Friends");
    assert_eq!(body["entries"][0]["user"]["username"], "bob");
    assert_eq!(body["entries"][0]["points"], 1);
    assert_eq!(body["entries"][1]["user"]["username"], "alice");
    assert_eq!(body["entries"][1]["points"], 0);
    assert_eq!(body["leagues"][0]["league_id"], 39);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let h = harness();
    let server = server_for(&h);
    let response = server.get("/events/404/leaderboard").expect_failure().await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "Event 404 not found");
}
