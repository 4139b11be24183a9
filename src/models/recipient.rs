//! Recipient entity model
//!
//! This module contains the SeaORM entity model for the recipients table,
//! which tracks each outreach email address through its delivery lifecycle.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a recipient.
///
/// Transitions are not strictly monotonic: a SENT recipient regresses to
/// FAILED when a retry fails.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    /// Never sent, eligible for the next batch
    #[sea_orm(string_value = "READY")]
    Ready,
    /// Dispatch in flight
    #[sea_orm(string_value = "SENDING")]
    Sending,
    /// Accepted by the provider
    #[sea_orm(string_value = "SENT")]
    Sent,
    /// Confirmed (webhook) or presumed (time fallback) delivered
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
    /// At least one open signal observed
    #[sea_orm(string_value = "OPENED")]
    Opened,
    /// Provider blocked the message
    #[sea_orm(string_value = "BLOCKED")]
    Blocked,
    /// Provider reported a bounce
    #[sea_orm(string_value = "BOUNCED")]
    Bounced,
    /// Provider dropped the message (includes spam reports)
    #[sea_orm(string_value = "DROPPED")]
    Dropped,
    /// Dispatch failed on our side
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl EmailStatus {
    /// Terminal failure-like statuses that the retry endpoint accepts.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmailStatus::Failed | EmailStatus::Blocked | EmailStatus::Bounced | EmailStatus::Dropped
        )
    }
}

/// Recipient entity representing a tracked outreach email address
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "recipients")]
pub struct Model {
    /// Unique identifier for the recipient (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Email address (unique across the table)
    #[sea_orm(unique)]
    pub email: String,

    /// Display name, used by `{{name}}` substitution
    pub name: Option<String>,

    /// Country, used by `{{country}}` substitution
    pub country: Option<String>,

    /// Phone number, used by `{{phone}}` substitution
    pub phone: Option<String>,

    /// LinkedIn handle or URL, used by `{{linkedin}}` substitution
    pub linkedin: Option<String>,

    /// GitHub handle or URL, used by `{{github}}` substitution
    pub github: Option<String>,

    /// Current lifecycle status (mutable projection of the event ledger)
    pub status: EmailStatus,

    /// Human-readable reason for the most recent failure
    pub last_error: Option<String>,

    /// Timestamp of the most recent successful dispatch
    pub sent_at: Option<DateTimeWithTimeZone>,

    /// Rendered subject actually sent on the last successful dispatch
    pub sent_subject: Option<String>,

    /// Rendered body actually sent on the last successful dispatch
    pub sent_body: Option<String>,

    /// First-open timestamp; once set it is never cleared or moved forward
    pub opened_at: Option<DateTimeWithTimeZone>,

    /// Monotonic counter of observed open signals
    pub open_count: i32,

    /// IP address from the most recent open signal
    pub ip_address: Option<String>,

    /// Humanized user agent from the most recent open signal
    pub user_agent: Option<String>,

    /// Formatted geolocation from the most recent open signal
    pub geo_location: Option<String>,

    /// Timestamp when the recipient was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the recipient was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::email_event::Entity")]
    EmailEvent,
}

impl Related<super::email_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_terminal_failures() {
        for status in [
            EmailStatus::Failed,
            EmailStatus::Blocked,
            EmailStatus::Bounced,
            EmailStatus::Dropped,
        ] {
            assert!(status.is_retryable(), "{:?} should be retryable", status);
        }

        for status in [
            EmailStatus::Ready,
            EmailStatus::Sending,
            EmailStatus::Sent,
            EmailStatus::Delivered,
            EmailStatus::Opened,
        ] {
            assert!(!status.is_retryable(), "{:?} should not be retryable", status);
        }
    }
}
