//! # Template API Handlers
//!
//! The active template, saves with the single-active swap, and the history
//! listing.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, validation_error};
use crate::handlers::types::{ApiResponse, TemplateDto};
use crate::server::AppState;

/// Request payload for saving a template
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaveTemplateDto {
    #[schema(example = "Hi {{name}}")]
    pub subject: String,
    #[schema(example = "Hello {{name}},\nvisit {{linkedin}}")]
    pub body: String,
}

/// Get the currently active template
#[utoipa::path(
    get,
    path = "/api/template",
    responses(
        (status = 200, description = "Active template, or null when none is saved", body = ApiResponse<Option<TemplateDto>>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "templates"
)]
pub async fn get_active_template(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Option<TemplateDto>>>, ApiError> {
    let template = state.templates().active().await?;
    Ok(Json(ApiResponse::new(template.map(TemplateDto::from))))
}

/// Save a template and make it active
#[utoipa::path(
    put,
    path = "/api/template",
    request_body = SaveTemplateDto,
    responses(
        (status = 200, description = "Template saved and activated", body = ApiResponse<TemplateDto>),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "templates"
)]
pub async fn save_template(
    State(state): State<AppState>,
    Json(request): Json<SaveTemplateDto>,
) -> Result<Json<ApiResponse<TemplateDto>>, ApiError> {
    if request.subject.trim().is_empty() {
        return Err(validation_error(
            "Subject is required",
            serde_json::json!({ "field": "subject" }),
        ));
    }
    if request.body.trim().is_empty() {
        return Err(validation_error(
            "Body is required",
            serde_json::json!({ "field": "body" }),
        ));
    }

    let saved = state
        .templates()
        .save(request.subject, request.body)
        .await?;
    Ok(Json(ApiResponse::new(saved.into())))
}

/// Recent template history
#[utoipa::path(
    get,
    path = "/api/templates",
    responses(
        (status = 200, description = "Last saved templates, newest first", body = ApiResponse<Vec<TemplateDto>>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "templates"
)]
pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TemplateDto>>>, ApiError> {
    let templates = state.templates().history().await?;
    Ok(Json(ApiResponse::new(
        templates.into_iter().map(TemplateDto::from).collect(),
    )))
}
