//! # Send API Handlers
//!
//! Batch orchestration entry points: send-all, send-selected, and the
//! single-recipient retry.

use axum::http::StatusCode;
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::types::{ApiResponse, RecipientDto};
use crate::sender::{BatchSummary, SendError};
use crate::server::AppState;

impl From<SendError> for ApiError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NoActiveTemplate | SendError::NothingToSend | SendError::NotRetryable => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &err.to_string())
            }
            SendError::RecipientNotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", &err.to_string())
            }
            SendError::Database(db_err) => db_err.into(),
        }
    }
}

/// Request payload for sending to a selected subset
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendSelectedDto {
    pub ids: Vec<Uuid>,
}

/// Batch result: aggregate counts plus the refreshed recipient list
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchResultDto {
    pub summary: BatchSummaryDto,
    pub emails: Vec<RecipientDto>,
}

/// Aggregate counts for one batch
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchSummaryDto {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
}

async fn batch_result(state: &AppState, summary: BatchSummary) -> Result<BatchResultDto, ApiError> {
    let emails = state.recipients().list().await?;
    Ok(BatchResultDto {
        summary: BatchSummaryDto {
            total: summary.total,
            sent: summary.sent,
            failed: summary.failed,
        },
        emails: emails.into_iter().map(RecipientDto::from).collect(),
    })
}

/// Send to every READY recipient
#[utoipa::path(
    post,
    path = "/api/emails/send-all",
    responses(
        (status = 200, description = "Batch finished; partial failure is reported per recipient", body = ApiResponse<BatchResultDto>),
        (status = 400, description = "No active template or nothing to send", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "send"
)]
pub async fn send_all(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BatchResultDto>>, ApiError> {
    let summary = state.sender().send_all().await?;
    Ok(Json(ApiResponse::new(batch_result(&state, summary).await?)))
}

/// Send to an explicitly selected set of READY recipients
#[utoipa::path(
    post,
    path = "/api/emails/send-selected",
    request_body = SendSelectedDto,
    responses(
        (status = 200, description = "Batch finished", body = ApiResponse<BatchResultDto>),
        (status = 400, description = "No active template or no eligible recipients", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "send"
)]
pub async fn send_selected(
    State(state): State<AppState>,
    Json(request): Json<SendSelectedDto>,
) -> Result<Json<ApiResponse<BatchResultDto>>, ApiError> {
    let summary = state.sender().send_selected(&request.ids).await?;
    Ok(Json(ApiResponse::new(batch_result(&state, summary).await?)))
}

/// Retry a recipient in a terminal failure status
#[utoipa::path(
    post,
    path = "/api/emails/{id}/retry",
    params(("id" = Uuid, Path, description = "Recipient id")),
    responses(
        (status = 200, description = "Retry dispatched; outcome reflected in the recipient", body = ApiResponse<RecipientDto>),
        (status = 400, description = "Recipient is not in a retryable status", body = ApiError),
        (status = 404, description = "Recipient not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "send"
)]
pub async fn retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RecipientDto>>, ApiError> {
    let updated = state.sender().retry(id).await?;
    Ok(Json(ApiResponse::new(updated.into())))
}
