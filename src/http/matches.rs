use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use super::errors::ApiError;
use super::{body_or_400, parse_match_id, AppState, ListQuery};
use crate::matches::{
    derive_status, sync_status, MatchStatus, NewMatchRequest, Score, ScoreUpdateRequest,
    SyncError,
};
use crate::utils::LimitBounds;

pub const MATCH_LIMIT: LimitBounds = LimitBounds::new(50, 100);

/// `GET /matches`
pub async fn list_matches(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = MATCH_LIMIT
        .resolve(query.limit.as_deref())
        .map_err(|msg| {
            ApiError::bad_request("Invalid query.")
                .with_details(json!([{"path": "limit", "message": msg}]))
        })?;

    let data = state
        .store
        .list_matches(limit)
        .await
        .map_err(|e| ApiError::internal("Failed to list matches.", &e))?;
    Ok(Json(json!({ "data": data })))
}

/// `POST /matches`
pub async fn create_match(
    State(state): State<AppState>,
    payload: Result<Json<NewMatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let new = body_or_400(payload, "Invalid payload.")?
        .validate()
        .map_err(|issues| ApiError::validation("Invalid payload.", &issues))?;

    let status = derive_status(Some(new.start_time), Some(new.end_time), Utc::now())
        .unwrap_or(MatchStatus::Scheduled);
    let created = state
        .store
        .create_match(new, status)
        .await
        .map_err(|e| ApiError::internal("Failed to create match.", &e))?;

    let delivery = state.hub.match_created(&created);
    log::info!(
        "match {} created ({} vs {}, {}), notified {} connections",
        created.id,
        created.home_team,
        created.away_team,
        created.status,
        delivery.sent
    );
    Ok((StatusCode::CREATED, Json(json!({ "data": created }))))
}

/// `PATCH /matches/{id}/score`
pub async fn update_score(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<ScoreUpdateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let match_id = parse_match_id(&raw_id)?;
    let score = body_or_400(payload, "Invalid payload")?
        .validate()
        .map_err(|issues| ApiError::validation("Invalid payload", &issues))?;

    let mut lifecycle = state
        .store
        .read_match_lifecycle_fields(match_id)
        .await
        .map_err(|e| ApiError::internal("Failed to update score", &e))?
        .ok_or_else(|| ApiError::not_found("Match not found"))?;

    let store = &state.store;
    sync_status(&mut lifecycle, Utc::now(), |next| {
        store.write_match_status(match_id, next)
    })
    .await
    .map_err(|SyncError::Persist(e)| ApiError::internal("Failed to update score", &e))?;

    if lifecycle.status != MatchStatus::Live {
        return Err(ApiError::conflict("Match is not live"));
    }

    let updated = state
        .store
        .update_score(match_id, score)
        .await
        .map_err(|e| ApiError::internal("Failed to update score", &e))?
        .ok_or_else(|| ApiError::not_found("Match not found"))?;

    state.hub.score_update(
        match_id,
        Score {
            home_score: updated.home_score,
            away_score: updated.away_score,
        },
    );
    Ok(Json(json!({ "data": updated })))
}
