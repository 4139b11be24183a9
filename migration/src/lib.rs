//! Database migrations for the Outreach API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_20_100000_create_recipients;
mod m2025_11_20_100100_create_templates;
mod m2025_11_20_100200_create_email_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_20_100000_create_recipients::Migration),
            Box::new(m2025_11_20_100100_create_templates::Migration),
            Box::new(m2025_11_20_100200_create_email_events::Migration),
        ]
    }
}
