//! The ledger store contract and its backends.

mod database;
mod input;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use favisend_common::{AppError, AppResult, Config, LedgerBackend, LedgerConfig};
use favisend_db::entities::{PaymentStatus, comment, download, file, payment, user};
use tracing::info;

pub use database::DatabaseLedger;
use input::MAX_TRANSACTION_ID_LENGTH;
pub use input::{FileChanges, NewComment, NewDownload, NewFile, NewPayment, NewUser};
pub use memory::MemoryLedger;

/// Attempts at drawing a share token that is not taken yet.
pub(crate) const MAX_SHARE_TOKEN_ATTEMPTS: usize = 8;

/// Persistence for users, files, downloads, comments and payments.
///
/// Every aggregate (download counters, running ratings, balances) is mutated
/// here and only here, as a side effect of recording the underlying event.
/// Lookups that find nothing return `Ok(None)`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // === Users ===

    /// User by ID.
    async fn get_user(&self, id: &str) -> AppResult<Option<user::Model>>;

    /// User by identity provider UID.
    async fn get_user_by_external_id(&self, external_id: &str)
    -> AppResult<Option<user::Model>>;

    /// User by login name.
    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<user::Model>>;

    /// User by email address.
    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<user::Model>>;

    /// Create a user with a zero balance.
    async fn create_user(&self, input: NewUser) -> AppResult<user::Model>;

    /// Atomically add `delta` to a balance. The only way a balance changes.
    async fn adjust_user_balance(&self, id: &str, delta: i64) -> AppResult<Option<user::Model>>;

    // === Files ===

    /// File by ID.
    async fn get_file(&self, id: &str) -> AppResult<Option<file::Model>>;

    /// File behind a public share link.
    async fn get_file_by_share_token(&self, token: &str) -> AppResult<Option<file::Model>>;

    /// Files owned by a user, newest first.
    async fn list_files_by_owner(&self, user_id: &str) -> AppResult<Vec<file::Model>>;

    /// Store file metadata under a fresh share token.
    async fn create_file(&self, input: NewFile, owner_id: &str) -> AppResult<file::Model>;

    /// Merge metadata changes. Counters, owner and share token are untouched.
    async fn update_file(&self, id: &str, changes: FileChanges)
    -> AppResult<Option<file::Model>>;

    /// Delete a file together with its downloads and comments.
    async fn delete_file(&self, id: &str) -> AppResult<bool>;

    /// Most downloaded files first.
    async fn list_popular_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>>;

    /// Newest files first.
    async fn list_recent_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>>;

    /// Best rated files first.
    async fn list_top_rated_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>>;

    // === Downloads ===

    /// Record a download, bump the file counter and credit the owner.
    async fn record_download(&self, input: NewDownload) -> AppResult<download::Model>;

    /// Download by ID.
    async fn get_download(&self, id: &str) -> AppResult<Option<download::Model>>;

    /// Downloads of one file, newest first.
    async fn list_file_downloads(&self, file_id: &str) -> AppResult<Vec<download::Model>>;

    /// Downloads of files owned by `user_id` (their earnings history).
    async fn list_user_downloads(&self, user_id: &str) -> AppResult<Vec<download::Model>>;

    /// Downloads performed by `user_id`.
    async fn list_downloads_made_by(&self, user_id: &str) -> AppResult<Vec<download::Model>>;

    // === Comments ===

    /// Comment by ID.
    async fn get_comment(&self, id: &str) -> AppResult<Option<comment::Model>>;

    /// Reviews of one file, newest first.
    async fn list_file_comments(&self, file_id: &str) -> AppResult<Vec<comment::Model>>;

    /// Store a review and fold its rating into the file's running average.
    async fn create_comment(&self, input: NewComment) -> AppResult<comment::Model>;

    // === Payments ===

    /// Create a pending payout.
    async fn create_payment(&self, input: NewPayment) -> AppResult<payment::Model>;

    /// Payment by ID.
    async fn get_payment(&self, id: &str) -> AppResult<Option<payment::Model>>;

    /// Payouts of one user, newest first.
    async fn list_user_payments(&self, user_id: &str) -> AppResult<Vec<payment::Model>>;

    /// Move a payment through its state machine.
    ///
    /// Completing debits the payee exactly once; repeating a terminal status
    /// returns the payment unchanged.
    async fn update_payment_status(
        &self,
        id: &str,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> AppResult<Option<payment::Model>>;
}

/// Running average after folding in one more rating.
///
/// Returns the new `(rating, total_ratings)` pair.
#[must_use]
pub fn next_rating(rating: f64, total_ratings: i32, new_rating: i32) -> (f64, i32) {
    let total = f64::from(total_ratings);
    let next_total = total_ratings.saturating_add(1);
    let next = rating.mul_add(total, f64::from(new_rating)) / f64::from(next_total);
    (next, next_total)
}

/// What a status update does to a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// Still pending; only the transaction id may change.
    StayPending,
    /// Settle and debit the payee.
    Complete,
    /// Record the failure.
    Fail,
    /// Already in the requested terminal state; nothing to do.
    Unchanged,
}

/// Decide how `current -> requested` is applied.
pub fn plan_payment_transition(
    current: PaymentStatus,
    requested: PaymentStatus,
) -> AppResult<PaymentTransition> {
    if current.can_transition_to(requested) {
        return Ok(match requested {
            PaymentStatus::Completed => PaymentTransition::Complete,
            PaymentStatus::Failed => PaymentTransition::Fail,
            PaymentStatus::Pending => PaymentTransition::StayPending,
        });
    }
    if current == requested {
        return Ok(if current.is_terminal() {
            PaymentTransition::Unchanged
        } else {
            PaymentTransition::StayPending
        });
    }
    Err(AppError::InvalidStateTransition {
        from: current.to_string(),
        to: requested.to_string(),
    })
}

/// Reject transaction references the `payment` table cannot hold.
pub(crate) fn check_transaction_id(transaction_id: Option<&str>) -> AppResult<()> {
    match transaction_id {
        Some(id) if id.chars().count() > MAX_TRANSACTION_ID_LENGTH => Err(AppError::Validation(
            format!("transaction_id is longer than {MAX_TRANSACTION_ID_LENGTH} characters"),
        )),
        _ => Ok(()),
    }
}

/// Amount actually credited for a download.
pub(crate) fn download_earnings(config: &LedgerConfig, input: &NewDownload) -> i64 {
    if input.user_id.is_none() && !config.credit_anonymous_downloads {
        return 0;
    }
    input.earnings.unwrap_or(config.earnings_per_download)
}

pub(crate) fn tags_json(tags: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        tags.iter()
            .map(|t| serde_json::Value::String(t.clone()))
            .collect(),
    )
}

/// Build the configured ledger backend.
///
/// The database backend connects and runs pending migrations first.
pub async fn open_ledger(config: &Config) -> AppResult<Arc<dyn LedgerStore>> {
    match config.ledger.backend {
        LedgerBackend::Memory => {
            info!("Using in-memory ledger");
            Ok(Arc::new(MemoryLedger::new(config.ledger.clone())))
        }
        LedgerBackend::Database => {
            let db_config = config.database.as_ref().ok_or_else(|| {
                AppError::Config("ledger.backend = \"database\" needs a [database] section".into())
            })?;

            let db = favisend_db::init(db_config).await?;
            info!("Connected to database");
            favisend_db::migrate(&db).await?;
            info!("Migrations completed");

            Ok(Arc::new(DatabaseLedger::new(
                Arc::new(db),
                config.ledger.clone(),
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_next_rating_scenario() {
        let (rating, total) = next_rating(0.0, 0, 4);
        assert!((rating - 4.0).abs() < f64::EPSILON);
        assert_eq!(total, 1);

        let (rating, total) = next_rating(rating, total, 2);
        assert!((rating - 3.0).abs() < f64::EPSILON);
        assert_eq!(total, 2);
    }

    #[test]
    fn test_next_rating_is_the_mean() {
        let ratings = [5, 1, 3, 4, 4, 2, 5];
        let (mut rating, mut total) = (0.0, 0);
        for r in ratings {
            (rating, total) = next_rating(rating, total, r);
        }
        let mean = f64::from(ratings.iter().sum::<i32>()) / 7.0;
        assert!((rating - mean).abs() < 1e-9);
        assert_eq!(total, 7);
    }

    #[test]
    fn test_plan_from_pending() {
        use PaymentStatus::{Completed, Failed, Pending};

        assert_eq!(
            plan_payment_transition(Pending, Pending).unwrap(),
            PaymentTransition::StayPending
        );
        assert_eq!(
            plan_payment_transition(Pending, Completed).unwrap(),
            PaymentTransition::Complete
        );
        assert_eq!(
            plan_payment_transition(Pending, Failed).unwrap(),
            PaymentTransition::Fail
        );
    }

    #[test]
    fn test_plan_from_terminal() {
        use PaymentStatus::{Completed, Failed, Pending};

        assert_eq!(
            plan_payment_transition(Completed, Completed).unwrap(),
            PaymentTransition::Unchanged
        );
        assert_eq!(
            plan_payment_transition(Failed, Failed).unwrap(),
            PaymentTransition::Unchanged
        );

        for (from, to) in [(Completed, Failed), (Completed, Pending), (Failed, Completed)] {
            let err = plan_payment_transition(from, to).unwrap_err();
            assert!(matches!(err, AppError::InvalidStateTransition { .. }));
        }
    }

    #[test]
    fn test_plan_follows_status_edges() {
        use PaymentStatus::{Completed, Failed, Pending};

        for from in [Pending, Completed, Failed] {
            for to in [Pending, Completed, Failed] {
                let plan = plan_payment_transition(from, to);
                let allowed = from.can_transition_to(to) || from == to;
                assert_eq!(plan.is_ok(), allowed, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_transaction_id_length() {
        assert!(check_transaction_id(None).is_ok());
        assert!(check_transaction_id(Some(&"t".repeat(256))).is_ok());

        let err = check_transaction_id(Some(&"t".repeat(257))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_download_earnings() {
        let mut config = LedgerConfig::default();
        let anonymous = NewDownload::anonymous("f1");
        let signed_in = NewDownload::by_user("f1", "u1");

        assert_eq!(download_earnings(&config, &anonymous), 450);

        config.credit_anonymous_downloads = false;
        assert_eq!(download_earnings(&config, &anonymous), 0);
        assert_eq!(download_earnings(&config, &signed_in), 450);

        let custom = NewDownload {
            earnings: Some(100),
            ..signed_in
        };
        assert_eq!(download_earnings(&config, &custom), 100);
    }

    #[tokio::test]
    async fn test_open_database_ledger_without_section() {
        let config = Config::from_toml_str("[ledger]\nbackend = \"database\"\n").unwrap();
        let err = open_ledger(&config).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
