//! # Latest Event Handler
//!
//! Polling fallback for clients without a realtime connection: the
//! timestamp of the most recent ledger row, so the UI only refetches when
//! something actually happened.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::handlers::types::ApiResponse;
use crate::server::AppState;

/// Most recent ledger activity marker
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LatestEventDto {
    pub last_event_time: Option<String>,
    pub last_email_id: Option<String>,
}

/// Timestamp of the most recent event
#[utoipa::path(
    get,
    path = "/api/events/latest",
    responses(
        (status = 200, description = "Latest event marker, nulls when the ledger is empty", body = ApiResponse<LatestEventDto>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "events"
)]
pub async fn latest_event(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<LatestEventDto>>, ApiError> {
    let latest = state.events().latest().await?;

    let dto = match latest {
        Some(event) => LatestEventDto {
            last_event_time: Some(event.created_at.to_rfc3339()),
            last_email_id: Some(event.email_id.to_string()),
        },
        None => LatestEventDto {
            last_event_time: None,
            last_email_id: None,
        },
    };

    Ok(Json(ApiResponse::new(dto)))
}
