//! Database migrations.
//!
//! Schema migrations for the ledger tables.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20250601_000001_create_user_table;
mod m20250601_000002_create_file_table;
mod m20250601_000003_create_download_table;
mod m20250601_000004_create_comment_table;
mod m20250601_000005_create_payment_table;

/// Runs the ledger schema migrations in order.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_user_table::Migration),
            Box::new(m20250601_000002_create_file_table::Migration),
            Box::new(m20250601_000003_create_download_table::Migration),
            Box::new(m20250601_000004_create_comment_table::Migration),
            Box::new(m20250601_000005_create_payment_table::Migration),
        ]
    }
}
