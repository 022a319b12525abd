//! Integration tests for the maintenance trigger
//!
//! These drive the production router over a real SQLite store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cadence_api::{
    ScheduleTemplate, Session, SessionKind, SessionStatus, SweepResponse,
};
use cadence_config::SweepPolicy;
use cadence_core::{MaintenanceSweep, SessionActions, SessionLifecycle};
use cadence_store::{ScheduleRepository, SessionRepository, SqliteStore, Store};
use cadence_util::{AthleteId, DayOfWeek, SessionId, WallClock};
use cadenced::http::{build_router, AppState};
use chrono::{Duration, NaiveDate};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

fn test_app(store: Arc<SqliteStore>, secret: Option<&str>) -> Router {
    let store: Arc<dyn Store> = store;
    let state = AppState {
        sweep: Arc::new(MaintenanceSweep::new(store.clone(), SweepPolicy::default())),
        store,
        cron_secret: secret.map(Arc::from),
    };
    build_router(state, std::time::Duration::from_secs(30))
}

async fn get(app: Router, uri: &str, token: Option<&str>) -> axum::response::Response {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {}", token));
    }
    app.oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_on(date: NaiveDate, status: SessionStatus) -> Session {
    Session {
        id: SessionId::new(),
        athlete_id: AthleteId::new("a1"),
        scheduled_date: date,
        start_time: WallClock::new(15, 0).unwrap(),
        end_time: WallClock::new(17, 0).unwrap(),
        kind: SessionKind::Practice,
        status,
        absence_reason: None,
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrong_secret_is_rejected_before_any_phase() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let yesterday = cadence_util::today() - Duration::days(1);
    let stale = session_on(yesterday, SessionStatus::Scheduled);
    store.insert_sessions_if_absent(&[stale.clone()]).unwrap();

    let app = test_app(store.clone(), Some("s3cret"));
    let response = get(app, "/api/maintenance/daily", Some("guess")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");
    assert_eq!(
        store.get_session(&stale.id).unwrap().unwrap().status,
        SessionStatus::Scheduled
    );
}

#[tokio::test]
async fn missing_header_is_rejected_when_secret_configured() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let response = get(test_app(store, Some("s3cret")), "/api/maintenance/daily", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn trigger_is_open_without_configured_secret() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let response = get(test_app(store, None), "/api/maintenance/daily", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Response contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_reports_overdue_sessions_marked() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let yesterday = cadence_util::today() - Duration::days(1);
    let stale = session_on(yesterday, SessionStatus::Scheduled);
    let done = session_on(yesterday - Duration::days(1), SessionStatus::Completed);
    store
        .insert_sessions_if_absent(&[stale.clone(), done.clone()])
        .unwrap();

    let app = test_app(store.clone(), Some("s3cret"));
    let response = get(app, "/api/maintenance/daily", Some("s3cret")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["overdueSessionsMarked"], 1);
    assert!(json["timestamp"].is_string());

    let body: SweepResponse = serde_json::from_value(json).unwrap();
    assert_eq!(body.overdue_sessions_marked, 1);

    let stale = store.get_session(&stale.id).unwrap().unwrap();
    assert_eq!(stale.status, SessionStatus::Absent);
    assert!(stale.absence_reason.is_some());
    assert_eq!(
        store.get_session(&done.id).unwrap().unwrap().status,
        SessionStatus::Completed
    );
}

#[tokio::test]
async fn repeated_trigger_keeps_horizon_without_duplicates() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let athlete = AthleteId::new("a1");
    let today = cadence_util::today();
    // One template per weekday: every date in the horizon gets a session
    for day in 0..7 {
        store
            .create_template(&ScheduleTemplate::new(
                athlete.clone(),
                DayOfWeek::new(day).unwrap(),
                WallClock::new(23, 0).unwrap(),
                WallClock::new(23, 30).unwrap(),
                SessionKind::Conditioning,
            ))
            .unwrap();
    }

    let first = body_json(get(test_app(store.clone(), None), "/api/maintenance/daily", None).await).await;
    let second = body_json(get(test_app(store.clone(), None), "/api/maintenance/daily", None).await).await;

    assert_eq!(first["sessionsMaterialized"], 8);
    assert_eq!(second["sessionsMaterialized"], 0);
    let sessions = store
        .list_sessions(&athlete, today, today + Duration::days(7))
        .unwrap();
    assert_eq!(sessions.len(), 8);
    assert!(store.find_duplicate_slots().unwrap().is_empty());
}

#[tokio::test]
async fn materialization_failure_returns_500_with_details() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence.db");
    let store = Arc::new(SqliteStore::open(&path).unwrap());
    rusqlite_drop_templates(&path);

    let response = get(test_app(store, None), "/api/maintenance/daily", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["error"], "Materialization failed");
    assert!(json["details"].is_string());
}

fn rusqlite_drop_templates(path: &std::path::Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch("DROP TABLE schedule_templates;").unwrap();
}

// ---------------------------------------------------------------------------
// Health and end-to-end completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_store() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let response = get(test_app(store, Some("s3cret")), "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store_healthy"], true);
}

#[tokio::test]
async fn completed_session_survives_sweep_with_one_star() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let yesterday = cadence_util::today() - Duration::days(1);
    let session = session_on(yesterday, SessionStatus::InProgress);
    store.insert_sessions_if_absent(&[session.clone()]).unwrap();

    let actions = SessionActions::new(store.clone(), SessionLifecycle::default());
    let end = yesterday.and_hms_opt(17, 30, 0).unwrap();
    actions
        .complete(&session.id, Default::default(), end)
        .unwrap();
    actions
        .complete(&session.id, Default::default(), end)
        .unwrap();

    let json = body_json(get(test_app(store.clone(), None), "/api/maintenance/daily", None).await).await;
    assert_eq!(json["overdueSessionsMarked"], 0);
    assert_eq!(
        store.get_session(&session.id).unwrap().unwrap().status,
        SessionStatus::Completed
    );
    assert_eq!(store.star_count_for_session(&session.id).unwrap(), 1);
}
