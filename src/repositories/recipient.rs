//! Recipient repository: CRUD, send-loop state changes, and the delivery
//! fallback sweep.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::models::recipient::{
    ActiveModel as RecipientActiveModel, Column, EmailStatus, Entity as Recipient,
    Model as RecipientModel,
};
use crate::reconcile::{self, Reconciled, Signal};
use crate::repositories::email_event::insert_event;

/// Request data for creating a new recipient.
#[derive(Debug, Clone)]
pub struct CreateRecipientRequest {
    pub email: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

/// Repository for recipient database operations.
#[derive(Debug, Clone)]
pub struct RecipientRepository {
    db: Arc<DatabaseConnection>,
}

impl RecipientRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts a new recipient in READY status. A duplicate email surfaces
    /// as a unique-violation `DbErr` for the handler to map to 409.
    pub async fn create(&self, request: CreateRecipientRequest) -> Result<RecipientModel, DbErr> {
        let now = Utc::now().fixed_offset();

        let recipient = RecipientActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(request.email),
            name: Set(request.name),
            country: Set(request.country),
            phone: Set(request.phone),
            linkedin: Set(request.linkedin),
            github: Set(request.github),
            status: Set(EmailStatus::Ready),
            open_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        recipient.insert(self.db.as_ref()).await
    }

    /// All recipients, newest first.
    pub async fn list(&self) -> Result<Vec<RecipientModel>, DbErr> {
        Recipient::find()
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<RecipientModel>, DbErr> {
        Recipient::find_by_id(id).one(self.db.as_ref()).await
    }

    /// Deletes a recipient; returns false when no row matched.
    pub async fn delete(&self, id: Uuid) -> Result<bool, DbErr> {
        let result = Recipient::delete_by_id(id).exec(self.db.as_ref()).await?;
        Ok(result.rows_affected > 0)
    }

    /// Recipients eligible for a full batch send.
    pub async fn find_ready(&self) -> Result<Vec<RecipientModel>, DbErr> {
        Recipient::find()
            .filter(Column::Status.eq(EmailStatus::Ready))
            .order_by_asc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await
    }

    /// Fetches the given recipients, preserving creation order.
    pub async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<RecipientModel>, DbErr> {
        Recipient::find()
            .filter(Column::Id.is_in(ids.iter().copied()))
            .order_by_asc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await
    }

    /// Marks a recipient as SENDING and clears the previous error before a
    /// dispatch attempt.
    pub async fn mark_sending(&self, recipient: RecipientModel) -> Result<RecipientModel, DbErr> {
        let mut active: RecipientActiveModel = recipient.into();
        active.status = Set(EmailStatus::Sending);
        active.last_error = Set(None);
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(self.db.as_ref()).await
    }

    /// Applies a reconciliation result: the full set of field writes plus
    /// the ledger append, atomically.
    pub async fn apply(&self, id: Uuid, reconciled: &Reconciled) -> Result<RecipientModel, DbErr> {
        let writes = &reconciled.writes;

        let active = RecipientActiveModel {
            id: Set(id),
            status: Set(writes.status),
            last_error: Set(writes.last_error.clone()),
            sent_at: Set(writes.sent_at),
            sent_subject: Set(writes.sent_subject.clone()),
            sent_body: Set(writes.sent_body.clone()),
            opened_at: Set(writes.opened_at),
            open_count: Set(writes.open_count),
            ip_address: Set(writes.ip_address.clone()),
            user_agent: Set(writes.user_agent.clone()),
            geo_location: Set(writes.geo_location.clone()),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        let event = reconciled.event.clone();
        let txn = self.db.begin().await?;
        let updated = active.update(&txn).await?;
        insert_event(&txn, id, &event).await?;
        txn.commit().await?;

        Ok(updated)
    }

    /// Delivery fallback sweep: SENT recipients whose send is older than the
    /// configured window and that have seen no later signal are presumed
    /// DELIVERED. Returns the number of recipients swept.
    pub async fn sweep_presumed_delivered(&self, window_minutes: i64) -> Result<u64, DbErr> {
        let now = Utc::now();
        let cutoff = (now - Duration::minutes(window_minutes)).fixed_offset();

        let stale = Recipient::find()
            .filter(Column::Status.eq(EmailStatus::Sent))
            .filter(Column::SentAt.lt(cutoff))
            .all(self.db.as_ref())
            .await?;

        let mut swept = 0;
        for recipient in stale {
            let Some(reconciled) = reconcile::reconcile(&recipient, Signal::DeliveryWindowElapsed, now)
            else {
                continue;
            };
            self.apply(recipient.id, &reconciled).await?;
            tracing::info!(recipient_id = %recipient.id, "Presumed delivered after fallback window");
            swept += 1;
        }

        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn repo() -> RecipientRepository {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        RecipientRepository::new(Arc::new(db))
    }

    fn request(email: &str) -> CreateRecipientRequest {
        CreateRecipientRequest {
            email: email.to_string(),
            name: Some("Ann".to_string()),
            country: None,
            phone: None,
            linkedin: None,
            github: None,
        }
    }

    #[tokio::test]
    async fn create_and_list_newest_first() {
        let repo = repo().await;

        let first = repo.create(request("a@example.com")).await.unwrap();
        assert_eq!(first.status, EmailStatus::Ready);
        assert_eq!(first.open_count, 0);

        repo.create(request("b@example.com")).await.unwrap();

        let listed = repo.list().await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let repo = repo().await;
        repo.create(request("a@example.com")).await.unwrap();

        let err = repo.create(request("a@example.com")).await.unwrap_err();
        let api: crate::error::ApiError = err.into();
        assert_eq!(api.status, axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let repo = repo().await;
        let created = repo.create(request("a@example.com")).await.unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn apply_writes_fields_and_appends_event() {
        let repo = repo().await;
        let created = repo.create(request("a@example.com")).await.unwrap();
        let marked = repo.mark_sending(created).await.unwrap();
        assert_eq!(marked.status, EmailStatus::Sending);

        let reconciled = reconcile::reconcile(
            &marked,
            Signal::DispatchSucceeded {
                subject: "Hi Ann".to_string(),
                body: "Hello".to_string(),
            },
            Utc::now(),
        )
        .unwrap();

        let updated = repo.apply(marked.id, &reconciled).await.unwrap();
        assert_eq!(updated.status, EmailStatus::Sent);
        assert_eq!(updated.sent_subject.as_deref(), Some("Hi Ann"));

        let events = crate::repositories::EmailEventRepository::new(repo.db.clone())
            .for_recipient(marked.id)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "sent");
    }

    #[tokio::test]
    async fn sweep_presumes_delivery_only_for_stale_sent_rows() {
        let repo = repo().await;
        let created = repo.create(request("a@example.com")).await.unwrap();

        // Backdate a SENT recipient past the fallback window.
        let mut active: RecipientActiveModel = created.clone().into();
        active.status = Set(EmailStatus::Sent);
        active.sent_at = Set(Some(
            (Utc::now() - Duration::minutes(10)).fixed_offset(),
        ));
        active.update(repo.db.as_ref()).await.unwrap();

        // A fresh SENT recipient stays untouched.
        let fresh = repo.create(request("b@example.com")).await.unwrap();
        let mut active: RecipientActiveModel = fresh.into();
        active.status = Set(EmailStatus::Sent);
        active.sent_at = Set(Some(Utc::now().fixed_offset()));
        active.update(repo.db.as_ref()).await.unwrap();

        let swept = repo.sweep_presumed_delivered(5).await.unwrap();
        assert_eq!(swept, 1);

        let updated = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(updated.status, EmailStatus::Delivered);
    }
}
