//! Migration to create the recipients table.
//!
//! Recipients are the tracked email addresses with their lifecycle status,
//! delivery metadata and latest open-tracking data.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Statement;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Recipients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Recipients::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Recipients::Email)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Recipients::Name).text().null())
                    .col(ColumnDef::new(Recipients::Country).text().null())
                    .col(ColumnDef::new(Recipients::Phone).text().null())
                    .col(ColumnDef::new(Recipients::Linkedin).text().null())
                    .col(ColumnDef::new(Recipients::Github).text().null())
                    .col(
                        ColumnDef::new(Recipients::Status)
                            .text()
                            .not_null()
                            .default("READY"),
                    )
                    .col(ColumnDef::new(Recipients::LastError).text().null())
                    .col(
                        ColumnDef::new(Recipients::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Recipients::SentSubject).text().null())
                    .col(ColumnDef::new(Recipients::SentBody).text().null())
                    .col(
                        ColumnDef::new(Recipients::OpenedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Recipients::OpenCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Recipients::IpAddress).text().null())
                    .col(ColumnDef::new(Recipients::UserAgent).text().null())
                    .col(ColumnDef::new(Recipients::GeoLocation).text().null())
                    .col(
                        ColumnDef::new(Recipients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Recipients::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for the dashboard list (newest first) using raw SQL
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_recipients_created ON recipients (created_at DESC)"
                    .to_string(),
            ))
            .await?;

        // Index for the READY/SENT status scans (batch sender, fallback sweep)
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "CREATE INDEX IF NOT EXISTS idx_recipients_status ON recipients (status)"
                    .to_string(),
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Recipients::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Recipients {
    Table,
    Id,
    Email,
    Name,
    Country,
    Phone,
    Linkedin,
    Github,
    Status,
    LastError,
    SentAt,
    SentSubject,
    SentBody,
    OpenedAt,
    OpenCount,
    IpAddress,
    UserAgent,
    GeoLocation,
    CreatedAt,
    UpdatedAt,
}
