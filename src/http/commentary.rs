use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::errors::ApiError;
use super::{body_or_400, parse_match_id, AppState, ListQuery};
use crate::matches::{NewCommentaryRequest, StoreError};
use crate::utils::LimitBounds;

pub const COMMENTARY_LIMIT: LimitBounds = LimitBounds::new(10, 100);

/// `GET /matches/{id}/commentary`
pub async fn list_commentary(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let match_id = parse_match_id(&raw_id)?;
    let limit = COMMENTARY_LIMIT
        .resolve(query.limit.as_deref())
        .map_err(|msg| {
            ApiError::bad_request("Invalid query parameters.")
                .with_details(json!([{"path": "limit", "message": msg}]))
        })?;

    let data = state
        .store
        .list_commentary(match_id, limit)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch commentary.", &e))?;
    Ok(Json(json!({ "data": data })))
}

/// `POST /matches/{id}/commentary`
pub async fn create_commentary(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    payload: Result<Json<NewCommentaryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let match_id = parse_match_id(&raw_id)?;
    let entry = body_or_400(payload, "Invalid commentary payload.")?
        .validate()
        .map_err(|issues| ApiError::validation("Invalid commentary payload.", &issues))?;

    let created = match state.store.create_commentary(match_id, entry).await {
        Ok(created) => created,
        Err(StoreError::MatchNotFound(_)) => return Err(ApiError::not_found("Match not found")),
        Err(e) => return Err(ApiError::internal("Failed to create commentary.", &e)),
    };

    state.hub.commentary(&created);
    Ok((StatusCode::CREATED, Json(json!({ "data": created }))))
}
