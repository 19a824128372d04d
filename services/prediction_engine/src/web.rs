use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::engine::{Engine, EngineError};
use crate::metrics::StatsSnapshot;
use crate::types::EventId;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
}

struct ApiError(EngineError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::EventNotFound(_)
            | EngineError::InviteCodeNotFound(_)
            | EngineError::MissingUser(_)
            | EngineError::MissingRelation { .. } => StatusCode::NOT_FOUND,
            EngineError::Store(e) => {
                error!("Store failure while serving request: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[axum::debug_handler]
pub async fn health_handler() -> impl IntoResponse {
    Json(Health { status: "ok" })
}

#[axum::debug_handler]
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.engine.metrics().snapshot())
}

#[axum::debug_handler]
pub async fn leaderboard_handler(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, ApiError> {
    let leaderboard = state
        .engine
        .compute_event_leaderboard(event_id)
        .await
        .map_err(ApiError)?;
    Ok(Json(leaderboard))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/events/{event_id}/leaderboard", get(leaderboard_handler))
        .with_state(state)
}

pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Web interface available at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
