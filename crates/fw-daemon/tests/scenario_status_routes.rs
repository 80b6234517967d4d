//! Scenario: status surface.
//!
//! # Invariants under test
//! 1. `GET /v1/health` answers without touching any dependency.
//! 2. `GET /v1/status` lists every configured instrument, including ones
//!    that have not ticked yet, and reflects the latest tick outcome.
//! 3. `GET /v1/status/{id}` returns one instrument, 404 for unknown ids.
//!
//! All tests are pure in-process; no DB or network required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use chrono::Utc;
use fw_daemon::{routes, state::AppState};
use fw_reconcile::TickOutcome;
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn get(router: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body: bytes::Bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, serde_json::from_slice(&body).expect("body is not valid JSON"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_ok() {
    let st = Arc::new(AppState::new(["MARI"]));
    let (status, json) = get(routes::build_router(st), "/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "fw-daemon");
}

#[tokio::test]
async fn status_lists_every_instrument() {
    let st = Arc::new(AppState::new(["MARI", "LET"]));

    let mut out = TickOutcome::new("MARI");
    out.last_published_before = Some(5);
    out.last_published_after = Some(9);
    out.published = vec![6, 7, 8, 9];
    out.recovery = true;
    st.record_tick(&out, Utc::now()).await;

    let (status, json) = get(routes::build_router(Arc::clone(&st)), "/v1/status").await;
    assert_eq!(status, StatusCode::OK);

    let instruments = json["instruments"].as_array().expect("instruments array");
    assert_eq!(instruments.len(), 2);

    // BTreeMap order: LET before MARI.
    assert_eq!(instruments[0]["instrument_id"], "LET");
    assert!(instruments[0]["last_tick_at"].is_null());

    assert_eq!(instruments[1]["instrument_id"], "MARI");
    assert_eq!(instruments[1]["last_outcome"], "ok");
    assert_eq!(instruments[1]["last_published"], 9);
    assert_eq!(instruments[1]["published_total"], 4);
    assert!(instruments[1]["paused_until"].is_null());
}

#[tokio::test]
async fn status_for_one_instrument() {
    let st = Arc::new(AppState::new(["MARI"]));

    let mut out = TickOutcome::new("MARI");
    out.last_published_before = Some(5);
    out.last_published_after = Some(5);
    out.skipped = vec![6];
    st.record_tick(&out, Utc::now()).await;

    let (status, json) = get(routes::build_router(Arc::clone(&st)), "/v1/status/MARI").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["instrument_id"], "MARI");
    assert_eq!(json["skipped_total"], 1);

    let (status, json) = get(routes::build_router(st), "/v1/status/WISH").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "unknown instrument WISH");
}
