//! Template entity model
//!
//! This module contains the SeaORM entity model for the templates table.
//! Templates are append-only; at most one row is active at any time.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Template entity holding a reusable subject/body pair with placeholder tokens
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "templates")]
pub struct Model {
    /// Unique identifier for the template (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Subject line, may contain `{{...}}` placeholder tokens
    pub subject: String,

    /// Body text, may contain `{{...}}` placeholder tokens
    pub body: String,

    /// Whether this is the template used by the next send run
    pub is_active: bool,

    /// Timestamp when the template was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the template was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
