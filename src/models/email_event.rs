//! EmailEvent entity model
//!
//! This module contains the SeaORM entity model for the email_events table,
//! the append-only ledger of every status-affecting signal observed for a
//! recipient. Rows are never updated or deleted; ordering by `timestamp`
//! gives the canonical per-recipient history.

use super::recipient::{EmailStatus, Entity as Recipient};
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// EmailEvent entity representing one observed signal
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "email_events")]
pub struct Model {
    /// Unique identifier for the event (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Recipient this event belongs to
    pub email_id: Uuid,

    /// Free-text event tag (`sent`, `failed`, `open`, `delivered`,
    /// `bounce`, `blocked`, `dropped`, `retry_failed`, ...)
    pub event: String,

    /// Recipient status resulting from this event at the time it was observed
    pub status: EmailStatus,

    /// IP address attached to the signal, when available
    pub ip_address: Option<String>,

    /// Humanized user agent attached to the signal, when available
    pub user_agent: Option<String>,

    /// Formatted geolocation attached to the signal, when available
    pub geo_location: Option<String>,

    /// Failure reason attached to the signal, when available
    pub error_reason: Option<String>,

    /// Raw provider payload for audit purposes
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,

    /// Event-reported time (distinct from row-insertion time)
    pub timestamp: DateTimeWithTimeZone,

    /// Row-insertion time
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Recipient",
        from = "Column::EmailId",
        to = "super::recipient::Column::Id"
    )]
    Recipient,
}

impl Related<Recipient> for Entity {
    fn to() -> RelationDef {
        Relation::Recipient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
