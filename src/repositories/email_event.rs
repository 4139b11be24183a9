//! Email event repository: the append-only ledger behind every recipient's
//! status history.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::models::email_event::{
    ActiveModel as EventActiveModel, Column, Entity as EmailEvent, Model as EventModel,
};
use crate::reconcile::EventDraft;

/// Inserts one ledger row on the given connection, which lets callers batch
/// the append into a transaction with the recipient update.
pub async fn insert_event<C: ConnectionTrait>(
    conn: &C,
    email_id: Uuid,
    draft: &EventDraft,
) -> Result<EventModel, DbErr> {
    let event = EventActiveModel {
        id: Set(Uuid::new_v4()),
        email_id: Set(email_id),
        event: Set(draft.event.clone()),
        status: Set(draft.status),
        ip_address: Set(draft.ip_address.clone()),
        user_agent: Set(draft.user_agent.clone()),
        geo_location: Set(draft.geo_location.clone()),
        error_reason: Set(draft.error_reason.clone()),
        payload: Set(draft.payload.clone()),
        timestamp: Set(draft.timestamp),
        created_at: Set(Utc::now().fixed_offset()),
    };

    event.insert(conn).await
}

/// Repository for reading and appending email events.
#[derive(Debug, Clone)]
pub struct EmailEventRepository {
    db: Arc<DatabaseConnection>,
}

impl EmailEventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Appends a ledger row outside any recipient update, used for events
    /// that change no recipient state (for example unrecognized webhook
    /// event types).
    pub async fn append(&self, email_id: Uuid, draft: &EventDraft) -> Result<EventModel, DbErr> {
        insert_event(self.db.as_ref(), email_id, draft).await
    }

    /// Full history for one recipient in occurrence order.
    pub async fn for_recipient(&self, email_id: Uuid) -> Result<Vec<EventModel>, DbErr> {
        EmailEvent::find()
            .filter(Column::EmailId.eq(email_id))
            .order_by_asc(Column::Timestamp)
            .all(self.db.as_ref())
            .await
    }

    /// The most recently recorded event across all recipients, for the
    /// polling fallback.
    pub async fn latest(&self) -> Result<Option<EventModel>, DbErr> {
        EmailEvent::find()
            .order_by_desc(Column::CreatedAt)
            .limit(1)
            .one(self.db.as_ref())
            .await
    }
}
