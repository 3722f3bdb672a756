//! HTTP surface: router wiring, shared state and the match/commentary API.

pub mod commentary;
pub mod errors;
pub mod matches;
pub mod middleware;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::admission::middleware::http_admission;
use crate::admission::AdmissionGateway;
use crate::matches::{MatchId, MatchStore};
use crate::realtime::RealtimeHub;
use crate::ws::ws_handler;
use errors::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MatchStore>,
    pub hub: Arc<RealtimeHub>,
    pub admission: Arc<AdmissionGateway>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MatchStore>,
        hub: Arc<RealtimeHub>,
        admission: Arc<AdmissionGateway>,
    ) -> Self {
        Self {
            store,
            hub,
            admission,
        }
    }
}

/// `?limit=` on list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
}

/// Positive integer path id
pub(crate) fn parse_match_id(raw: &str) -> Result<MatchId, ApiError> {
    match raw.trim().parse::<MatchId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request("Invalid match ID.")
            .with_details(json!([{"path": "id", "message": "must be a positive integer"}]))),
    }
}

/// Unwrap a JSON body, turning axum's rejection into our 400 shape
pub(crate) fn body_or_400<T>(
    payload: Result<Json<T>, JsonRejection>,
    message: &str,
) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        ApiError::bad_request(message)
            .with_details(json!([{"path": "", "message": rejection.body_text()}]))
    })
}

async fn root() -> &'static str {
    "Welcome to the Matchcast server!"
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let registry = state.hub.registry().stats();
    let broadcast = state.hub.broadcaster().stats();
    Json(json!({
        "status": "ok",
        "store": state.store.backend_name(),
        "admission": state.admission.provider_name(),
        "connections": registry.connections,
        "subscribedMatches": registry.subscribed_matches,
        "subscriptions": registry.subscriptions,
        "evicted": registry.total_evicted,
        "sent": broadcast.total_sent,
        "skipped": broadcast.total_skipped,
        "serialized": broadcast.total_serialized,
    }))
}

/// Build the application router.
///
/// API routes sit behind the HTTP admission profile; `/ws` runs the upgrade
/// profile itself and `/_health` is never filtered.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/", get(root))
        .route(
            "/matches",
            get(matches::list_matches).post(matches::create_match),
        )
        .route("/matches/{id}/score", patch(matches::update_score))
        .route(
            "/matches/{id}/commentary",
            get(commentary::list_commentary).post(commentary::create_commentary),
        )
        .route_layer(from_fn_with_state(
            Arc::clone(&state.admission),
            http_admission,
        ));

    let open = Router::new()
        .route("/ws", get(ws_handler))
        .route("/_health", get(health));

    api.merge(open)
        .layer(from_fn(middleware::access_log))
        .with_state(state)
}
