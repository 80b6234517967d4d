//! Read-only status surface. Nothing here touches the state store, the
//! broker or the archive; handlers only read `AppState` snapshots written
//! by the instrument loops.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::{
    api_types::{ErrorResponse, HealthResponse, StatusResponse},
    state::{uptime_secs, AppState},
};

/// Bare router; `main.rs` adds the trace layer.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_all))
        .route("/v1/status/:instrument", get(status_one))
        .with_state(state)
}

async fn health(State(st): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: st.build.service,
        version: st.build.version,
    })
}

async fn status_all(State(st): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        daemon_uptime_secs: uptime_secs(),
        instruments: st.snapshot().await,
    })
}

async fn status_one(
    State(st): State<Arc<AppState>>,
    Path(instrument_id): Path<String>,
) -> Response {
    match st.instrument(&instrument_id).await {
        Some(status) => Json(status).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown instrument {instrument_id}"),
            }),
        )
            .into_response(),
    }
}
