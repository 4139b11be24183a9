//! Shared response envelope and DTOs for the HTTP surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::recipient::Model as RecipientModel;
use crate::models::template::Model as TemplateModel;
use crate::models::email_event::Model as EventModel;
use crate::models::EmailStatus;

/// Standard response wrapper: every endpoint replies `{ success, data }`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Recipient as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecipientDto {
    pub id: Uuid,
    #[schema(example = "ann@example.com")]
    pub email: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub status: EmailStatus,
    pub last_error: Option<String>,
    pub sent_at: Option<String>,
    pub sent_subject: Option<String>,
    pub sent_body: Option<String>,
    pub opened_at: Option<String>,
    pub open_count: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub geo_location: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<RecipientModel> for RecipientDto {
    fn from(model: RecipientModel) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            country: model.country,
            phone: model.phone,
            linkedin: model.linkedin,
            github: model.github,
            status: model.status,
            last_error: model.last_error,
            sent_at: model.sent_at.map(|t| t.to_rfc3339()),
            sent_subject: model.sent_subject,
            sent_body: model.sent_body,
            opened_at: model.opened_at.map(|t| t.to_rfc3339()),
            open_count: model.open_count,
            ip_address: model.ip_address,
            user_agent: model.user_agent,
            geo_location: model.geo_location,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Template as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDto {
    pub id: Uuid,
    #[schema(example = "Hi {{name}}")]
    pub subject: String,
    pub body: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TemplateModel> for TemplateDto {
    fn from(model: TemplateModel) -> Self {
        Self {
            id: model.id,
            subject: model.subject,
            body: model.body,
            is_active: model.is_active,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// One ledger row in a recipient's timeline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailEventDto {
    pub id: Uuid,
    pub email_id: Uuid,
    #[schema(example = "open")]
    pub event: String,
    pub status: EmailStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub geo_location: Option<String>,
    pub error_reason: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub timestamp: String,
    pub created_at: String,
}

impl From<EventModel> for EmailEventDto {
    fn from(model: EventModel) -> Self {
        Self {
            id: model.id,
            email_id: model.email_id,
            event: model.event,
            status: model.status,
            ip_address: model.ip_address,
            user_agent: model.user_agent,
            geo_location: model.geo_location,
            error_reason: model.error_reason,
            payload: model.payload,
            timestamp: model.timestamp.to_rfc3339(),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}
