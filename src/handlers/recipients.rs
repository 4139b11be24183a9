//! # Recipient API Handlers
//!
//! CRUD over recipients plus the per-recipient event timeline.

use std::sync::OnceLock;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, not_found, validation_error};
use crate::handlers::types::{ApiResponse, EmailEventDto, RecipientDto};
use crate::repositories::recipient::CreateRecipientRequest;
use crate::server::AppState;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"))
}

/// Request payload for adding a recipient
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateRecipientDto {
    #[schema(example = "ann@example.com")]
    pub email: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

/// List all recipients, newest first
#[utoipa::path(
    get,
    path = "/api/emails",
    responses(
        (status = 200, description = "All recipients", body = ApiResponse<Vec<RecipientDto>>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "recipients"
)]
pub async fn list_recipients(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<RecipientDto>>>, ApiError> {
    // Best-effort delivery fallback sweep before the read; a sweep failure
    // never fails the listing.
    if let Err(err) = state
        .recipients()
        .sweep_presumed_delivered(state.config.delivery_fallback_minutes)
        .await
    {
        tracing::error!(error = %err, "Delivery fallback sweep failed");
    }

    let recipients = state.recipients().list().await?;
    Ok(Json(ApiResponse::new(
        recipients.into_iter().map(RecipientDto::from).collect(),
    )))
}

/// Add a new recipient
#[utoipa::path(
    post,
    path = "/api/emails",
    request_body = CreateRecipientDto,
    responses(
        (status = 201, description = "Recipient created", body = ApiResponse<RecipientDto>),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 409, description = "Email already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "recipients"
)]
pub async fn create_recipient(
    State(state): State<AppState>,
    Json(request): Json<CreateRecipientDto>,
) -> Result<(StatusCode, Json<ApiResponse<RecipientDto>>), ApiError> {
    let email = request.email.trim().to_string();
    if email.is_empty() {
        return Err(validation_error(
            "Email is required",
            serde_json::json!({ "field": "email" }),
        ));
    }
    if !email_regex().is_match(&email) {
        return Err(validation_error(
            "Invalid email format",
            serde_json::json!({ "field": "email", "value": email }),
        ));
    }

    let none_if_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let created = state
        .recipients()
        .create(CreateRecipientRequest {
            email,
            name: none_if_blank(request.name),
            country: none_if_blank(request.country),
            phone: none_if_blank(request.phone),
            linkedin: none_if_blank(request.linkedin),
            github: none_if_blank(request.github),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(created.into())),
    ))
}

/// Delete a recipient
#[utoipa::path(
    delete,
    path = "/api/emails/{id}",
    params(("id" = Uuid, Path, description = "Recipient id")),
    responses(
        (status = 200, description = "Recipient deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Recipient not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "recipients"
)]
pub async fn delete_recipient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    if !state.recipients().delete(id).await? {
        return Err(not_found("Email not found"));
    }

    Ok(Json(ApiResponse::new(serde_json::json!({ "id": id }))))
}

/// Event timeline for one recipient, in occurrence order
#[utoipa::path(
    get,
    path = "/api/emails/{id}/events",
    params(("id" = Uuid, Path, description = "Recipient id")),
    responses(
        (status = 200, description = "Event history", body = ApiResponse<Vec<EmailEventDto>>),
        (status = 404, description = "Recipient not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "recipients"
)]
pub async fn recipient_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<EmailEventDto>>>, ApiError> {
    if state.recipients().find_by_id(id).await?.is_none() {
        return Err(not_found("Email not found"));
    }

    let events = state.events().for_recipient(id).await?;
    Ok(Json(ApiResponse::new(
        events.into_iter().map(EmailEventDto::from).collect(),
    )))
}
