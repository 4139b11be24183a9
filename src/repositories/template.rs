//! Template repository: the single-active-template rule and the saved
//! history.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::models::template::{
    ActiveModel as TemplateActiveModel, Column, Entity as Template, Model as TemplateModel,
};

/// Number of templates kept visible in the history listing.
const HISTORY_LIMIT: u64 = 20;

/// Repository for template database operations.
#[derive(Debug, Clone)]
pub struct TemplateRepository {
    db: Arc<DatabaseConnection>,
}

impl TemplateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The currently active template, if any.
    pub async fn active(&self) -> Result<Option<TemplateModel>, DbErr> {
        Template::find()
            .filter(Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await
    }

    /// Saves a template and makes it the active one.
    ///
    /// An identical subject and body reactivates the existing row instead of
    /// creating a duplicate. Deactivation of the previous active template and
    /// activation of the new one commit together, so readers never observe
    /// zero or two active templates.
    pub async fn save(&self, subject: String, body: String) -> Result<TemplateModel, DbErr> {
        let txn = self.db.begin().await?;
        let now = Utc::now().fixed_offset();

        let existing = Template::find()
            .filter(Column::Subject.eq(subject.clone()))
            .filter(Column::Body.eq(body.clone()))
            .one(&txn)
            .await?;

        Template::update_many()
            .col_expr(Column::IsActive, Expr::value(false))
            .filter(Column::IsActive.eq(true))
            .exec(&txn)
            .await?;

        let saved = match existing {
            Some(template) => {
                let mut active: TemplateActiveModel = template.into();
                active.is_active = Set(true);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                let template = TemplateActiveModel {
                    id: Set(Uuid::new_v4()),
                    subject: Set(subject),
                    body: Set(body),
                    is_active: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                template.insert(&txn).await?
            }
        };

        txn.commit().await?;
        Ok(saved)
    }

    /// Recent templates, newest first.
    pub async fn history(&self) -> Result<Vec<TemplateModel>, DbErr> {
        Template::find()
            .order_by_desc(Column::CreatedAt)
            .limit(HISTORY_LIMIT)
            .all(self.db.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::{Database, PaginatorTrait};

    async fn repo() -> TemplateRepository {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        TemplateRepository::new(Arc::new(db))
    }

    #[tokio::test]
    async fn save_activates_exactly_one_template() {
        let repo = repo().await;

        let first = repo
            .save("Hi {{name}}".to_string(), "Hello".to_string())
            .await
            .unwrap();
        assert!(first.is_active);
        assert_eq!(repo.active().await.unwrap().unwrap().id, first.id);

        let second = repo
            .save("New subject".to_string(), "New body".to_string())
            .await
            .unwrap();

        let active = repo.active().await.unwrap().unwrap();
        assert_eq!(active.id, second.id);

        let active_count = Template::find()
            .filter(Column::IsActive.eq(true))
            .count(repo.db.as_ref())
            .await
            .unwrap();
        assert_eq!(active_count, 1);
    }

    #[tokio::test]
    async fn identical_content_reactivates_instead_of_duplicating() {
        let repo = repo().await;

        let first = repo
            .save("Subject".to_string(), "Body".to_string())
            .await
            .unwrap();
        repo.save("Other".to_string(), "Other body".to_string())
            .await
            .unwrap();

        let reactivated = repo
            .save("Subject".to_string(), "Body".to_string())
            .await
            .unwrap();

        assert_eq!(reactivated.id, first.id);
        assert_eq!(
            Template::find().count(repo.db.as_ref()).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let repo = repo().await;
        repo.save("One".to_string(), "Body".to_string())
            .await
            .unwrap();
        repo.save("Two".to_string(), "Body".to_string())
            .await
            .unwrap();

        let history = repo.history().await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
