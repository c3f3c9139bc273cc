//! Database layer for favisend.

pub mod entities;
pub mod migrations;
pub mod repositories;
pub mod test_utils;

use favisend_common::{AppError, DatabaseConfig};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, SqlErr};
use std::time::Duration;
use tracing::log::LevelFilter;

/// Initialize database connection.
pub async fn init(config: &DatabaseConfig) -> Result<DatabaseConnection, AppError> {
    let mut opt = ConnectOptions::new(&config.url);

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt).await.map_err(db_err)
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None).await.map_err(db_err)
}

/// Translate a sea-orm error into the ledger error taxonomy.
///
/// Constraint violations become [`AppError::DuplicateKey`] and
/// [`AppError::DanglingReference`]; connection failures become
/// [`AppError::StorageUnavailable`] so callers can decide whether to retry.
#[must_use]
pub fn db_err(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => return AppError::DuplicateKey(msg),
        Some(SqlErr::ForeignKeyConstraintViolation(msg)) => {
            return AppError::DanglingReference(msg);
        }
        _ => {}
    }

    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
            AppError::StorageUnavailable(err.to_string())
        }
        other => AppError::Database(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnAcquireErr, RuntimeErr};

    #[test]
    fn test_connection_errors_are_unavailable() {
        let err = db_err(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout));
        assert!(matches!(err, AppError::StorageUnavailable(_)));

        let err = db_err(DbErr::Conn(RuntimeErr::Internal("refused".to_string())));
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }

    #[test]
    fn test_other_errors_are_database_errors() {
        let err = db_err(DbErr::RecordNotFound("file".to_string()));
        assert!(matches!(err, AppError::Database(_)));
    }
}
