//! Migration to create the email_events table.
//!
//! The append-only ledger of every status-affecting signal observed for a
//! recipient. `timestamp` carries the event-reported time; `created_at` the
//! row-insertion time.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

use crate::m2025_11_20_100000_create_recipients::Recipients;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EmailEvents::EmailId).uuid().not_null())
                    .col(ColumnDef::new(EmailEvents::Event).text().not_null())
                    .col(ColumnDef::new(EmailEvents::Status).text().not_null())
                    .col(ColumnDef::new(EmailEvents::IpAddress).text().null())
                    .col(ColumnDef::new(EmailEvents::UserAgent).text().null())
                    .col(ColumnDef::new(EmailEvents::GeoLocation).text().null())
                    .col(ColumnDef::new(EmailEvents::ErrorReason).text().null())
                    .col(ColumnDef::new(EmailEvents::Payload).json_binary().null())
                    .col(
                        ColumnDef::new(EmailEvents::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_events_email_id")
                            .from(EmailEvents::Table, EmailEvents::EmailId)
                            .to(Recipients::Table, Recipients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Per-recipient timeline queries ordered by event-reported time
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_email_events_email_ts ON email_events (email_id, timestamp)"
                    .to_string(),
            ))
            .await?;

        // Latest-event polling endpoint
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_email_events_created ON email_events (created_at DESC)"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmailEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EmailEvents {
    Table,
    Id,
    EmailId,
    Event,
    Status,
    IpAddress,
    UserAgent,
    GeoLocation,
    ErrorReason,
    Payload,
    Timestamp,
    CreatedAt,
}
