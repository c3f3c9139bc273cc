//! Ledger on top of sea-orm.
//!
//! Composite operations run in a transaction and take a `SELECT ... FOR
//! UPDATE` lock on the file or payment row first, so concurrent writers of
//! the same row queue up instead of losing updates. Dropping a transaction
//! without committing rolls it back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use favisend_common::{AppError, AppResult, IdGenerator, LedgerConfig};
use favisend_db::{
    db_err,
    entities::{PaymentStatus, comment, download, file, payment, user},
    repositories::{
        CommentRepository, DownloadRepository, FileRepository, PaymentRepository, UserRepository,
    },
};
use sea_orm::{DatabaseConnection, Set, TransactionTrait, prelude::DateTimeWithTimeZone};
use tracing::{debug, info, warn};
use validator::Validate;

use super::{
    FileChanges, LedgerStore, MAX_SHARE_TOKEN_ATTEMPTS, NewComment, NewDownload, NewFile,
    NewPayment, NewUser, PaymentTransition, check_transaction_id, download_earnings, next_rating,
    plan_payment_transition, tags_json,
};
use crate::password::hash_password;

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

fn missing(kind: &str, id: &str) -> AppError {
    AppError::DanglingReference(format!("{kind} {id} does not exist"))
}

/// Ledger persisted in `PostgreSQL`.
#[derive(Clone)]
pub struct DatabaseLedger {
    db: Arc<DatabaseConnection>,
    users: UserRepository,
    files: FileRepository,
    downloads: DownloadRepository,
    comments: CommentRepository,
    payments: PaymentRepository,
    id_gen: IdGenerator,
    config: LedgerConfig,
}

impl DatabaseLedger {
    /// Create a ledger over an already migrated database.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, config: LedgerConfig) -> Self {
        Self {
            users: UserRepository::new(Arc::clone(&db)),
            files: FileRepository::new(Arc::clone(&db)),
            downloads: DownloadRepository::new(Arc::clone(&db)),
            comments: CommentRepository::new(Arc::clone(&db)),
            payments: PaymentRepository::new(Arc::clone(&db)),
            db,
            id_gen: IdGenerator::new(),
            config,
        }
    }

    const fn limit(&self, limit: Option<u64>) -> u64 {
        match limit {
            Some(limit) => limit,
            None => self.config.default_list_limit,
        }
    }
}

#[async_trait]
impl LedgerStore for DatabaseLedger {
    async fn get_user(&self, id: &str) -> AppResult<Option<user::Model>> {
        self.users.find_by_id(id).await
    }

    async fn get_user_by_external_id(
        &self,
        external_id: &str,
    ) -> AppResult<Option<user::Model>> {
        self.users.find_by_external_id(external_id).await
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        self.users.find_by_username(username).await
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        self.users.find_by_email(email).await
    }

    async fn create_user(&self, input: NewUser) -> AppResult<user::Model> {
        input.validate()?;
        if !input.has_identity() {
            return Err(AppError::Validation(
                "a user needs an external id, username or email".into(),
            ));
        }

        let password_hash = input.password.as_deref().map(hash_password).transpose()?;
        let now = now();
        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            external_id: Set(input.external_id),
            username: Set(input.username),
            email: Set(input.email),
            password_hash: Set(password_hash),
            display_name: Set(input.display_name),
            avatar_url: Set(input.avatar_url),
            balance: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let user = self.users.create(model).await?;
        info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    async fn adjust_user_balance(&self, id: &str, delta: i64) -> AppResult<Option<user::Model>> {
        let user = self.users.adjust_balance(id, delta).await?;
        if let Some(user) = &user {
            debug!(user_id = %id, delta, balance = user.balance, "Adjusted balance");
        }
        Ok(user)
    }

    async fn get_file(&self, id: &str) -> AppResult<Option<file::Model>> {
        self.files.find_by_id(id).await
    }

    async fn get_file_by_share_token(&self, token: &str) -> AppResult<Option<file::Model>> {
        self.files.find_by_share_token(token).await
    }

    async fn list_files_by_owner(&self, user_id: &str) -> AppResult<Vec<file::Model>> {
        self.files.find_by_user(user_id).await
    }

    async fn create_file(&self, input: NewFile, owner_id: &str) -> AppResult<file::Model> {
        input.validate()?;
        if self.users.find_by_id(owner_id).await?.is_none() {
            return Err(missing("owner", owner_id));
        }

        let length = self.config.effective_share_token_length();
        let id = self.id_gen.generate();
        let tags = tags_json(&input.tags);
        let now = now();

        for attempt in 1..=MAX_SHARE_TOKEN_ATTEMPTS {
            let model = file::ActiveModel {
                id: Set(id.clone()),
                user_id: Set(owner_id.to_string()),
                title: Set(input.title.clone()),
                description: Set(input.description.clone()),
                file_name: Set(input.file_name.clone()),
                file_size: Set(input.file_size),
                content_type: Set(input.content_type.clone()),
                download_url: Set(input.download_url.clone()),
                share_token: Set(self.id_gen.generate_share_token(length)),
                tags: Set(tags.clone()),
                downloads: Set(0),
                rating: Set(0.0),
                total_ratings: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
            };

            // The ID is fresh, so a duplicate key can only be the share token.
            match self.files.create(model).await {
                Ok(file) => {
                    info!(file_id = %file.id, user_id = %owner_id, "Created file");
                    return Ok(file);
                }
                Err(AppError::DuplicateKey(_)) => {
                    warn!(file_id = %id, attempt, "Share token collision, drawing again");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::DuplicateKey(
            "could not draw an unused share token".into(),
        ))
    }

    async fn update_file(
        &self,
        id: &str,
        changes: FileChanges,
    ) -> AppResult<Option<file::Model>> {
        changes.validate()?;

        let Some(current) = self.files.find_by_id(id).await? else {
            return Ok(None);
        };

        let mut active: file::ActiveModel = current.into();
        if let Some(title) = changes.title {
            active.title = Set(title);
        }
        if let Some(description) = changes.description {
            active.description = Set(description);
        }
        if let Some(file_name) = changes.file_name {
            active.file_name = Set(file_name);
        }
        if let Some(file_size) = changes.file_size {
            active.file_size = Set(file_size);
        }
        if let Some(content_type) = changes.content_type {
            active.content_type = Set(content_type);
        }
        if let Some(download_url) = changes.download_url {
            active.download_url = Set(download_url);
        }
        if let Some(tags) = changes.tags {
            active.tags = Set(tags_json(&tags));
        }
        active.updated_at = Set(now());

        let file = self.files.update(active).await?;
        debug!(file_id = %id, "Updated file");
        Ok(Some(file))
    }

    async fn delete_file(&self, id: &str) -> AppResult<bool> {
        let txn = self.db.begin().await.map_err(db_err)?;

        if FileRepository::lock_on(&txn, id).await?.is_none() {
            return Ok(false);
        }

        let removed_downloads = DownloadRepository::delete_by_file_on(&txn, id).await?;
        let removed_comments = CommentRepository::delete_by_file_on(&txn, id).await?;
        FileRepository::delete_on(&txn, id).await?;

        txn.commit().await.map_err(db_err)?;

        info!(file_id = %id, removed_downloads, removed_comments, "Deleted file");
        Ok(true)
    }

    async fn list_popular_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>> {
        self.files.find_popular(self.limit(limit)).await
    }

    async fn list_recent_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>> {
        self.files.find_recent(self.limit(limit)).await
    }

    async fn list_top_rated_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>> {
        self.files.find_top_rated(self.limit(limit)).await
    }

    async fn record_download(&self, input: NewDownload) -> AppResult<download::Model> {
        input.validate()?;
        let earnings = download_earnings(&self.config, &input);

        let txn = self.db.begin().await.map_err(db_err)?;

        let file = FileRepository::lock_on(&txn, &input.file_id)
            .await?
            .ok_or_else(|| missing("file", &input.file_id))?;

        if let Some(user_id) = &input.user_id {
            if !UserRepository::exists_on(&txn, user_id).await? {
                return Err(missing("downloader", user_id));
            }
        }

        let record = download::ActiveModel {
            id: Set(self.id_gen.generate()),
            file_id: Set(input.file_id),
            user_id: Set(input.user_id),
            ip_address: Set(input.ip_address),
            user_agent: Set(input.user_agent),
            earnings: Set(earnings),
            created_at: Set(now()),
        };
        let record = DownloadRepository::insert_on(&txn, record).await?;

        FileRepository::increment_downloads_on(&txn, &file.id).await?;
        if earnings != 0 {
            UserRepository::adjust_balance_on(&txn, &file.user_id, earnings)
                .await?
                .ok_or_else(|| missing("owner", &file.user_id))?;
        }

        txn.commit().await.map_err(db_err)?;

        info!(
            file_id = %file.id,
            owner_id = %file.user_id,
            earnings,
            "Recorded download"
        );
        Ok(record)
    }

    async fn get_download(&self, id: &str) -> AppResult<Option<download::Model>> {
        self.downloads.find_by_id(id).await
    }

    async fn list_file_downloads(&self, file_id: &str) -> AppResult<Vec<download::Model>> {
        self.downloads.find_by_file(file_id).await
    }

    async fn list_user_downloads(&self, user_id: &str) -> AppResult<Vec<download::Model>> {
        self.downloads.find_by_file_owner(user_id).await
    }

    async fn list_downloads_made_by(&self, user_id: &str) -> AppResult<Vec<download::Model>> {
        self.downloads.find_by_downloader(user_id).await
    }

    async fn get_comment(&self, id: &str) -> AppResult<Option<comment::Model>> {
        self.comments.find_by_id(id).await
    }

    async fn list_file_comments(&self, file_id: &str) -> AppResult<Vec<comment::Model>> {
        self.comments.find_by_file(file_id).await
    }

    async fn create_comment(&self, input: NewComment) -> AppResult<comment::Model> {
        input.validate()?;

        let txn = self.db.begin().await.map_err(db_err)?;

        let file = FileRepository::lock_on(&txn, &input.file_id)
            .await?
            .ok_or_else(|| missing("file", &input.file_id))?;

        if !UserRepository::exists_on(&txn, &input.user_id).await? {
            return Err(missing("commenter", &input.user_id));
        }

        let record = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            file_id: Set(input.file_id),
            user_id: Set(input.user_id),
            body: Set(input.body),
            rating: Set(input.rating),
            created_at: Set(now()),
        };
        let record = CommentRepository::insert_on(&txn, record).await?;

        let (rating, total_ratings) = next_rating(file.rating, file.total_ratings, record.rating);
        FileRepository::set_rating_on(&txn, file, rating, total_ratings).await?;

        txn.commit().await.map_err(db_err)?;

        debug!(file_id = %record.file_id, rating, total_ratings, "Recorded comment");
        Ok(record)
    }

    async fn create_payment(&self, input: NewPayment) -> AppResult<payment::Model> {
        input.validate()?;
        if let Some(requested) = input.status.filter(|s| *s != PaymentStatus::Pending) {
            debug!(%requested, "New payments start pending, ignoring requested status");
        }

        let model = payment::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(input.user_id),
            amount: Set(input.amount),
            status: Set(PaymentStatus::Pending),
            payment_method: Set(input.payment_method),
            transaction_id: Set(input.transaction_id),
            details: Set(input.details),
            created_at: Set(now()),
            completed_at: Set(None),
        };

        // An unknown payee surfaces as a foreign key violation.
        let payment = self.payments.create(model).await?;
        info!(payment_id = %payment.id, user_id = %payment.user_id, amount = payment.amount, "Created payment");
        Ok(payment)
    }

    async fn get_payment(&self, id: &str) -> AppResult<Option<payment::Model>> {
        self.payments.find_by_id(id).await
    }

    async fn list_user_payments(&self, user_id: &str) -> AppResult<Vec<payment::Model>> {
        self.payments.find_by_user(user_id).await
    }

    async fn update_payment_status(
        &self,
        id: &str,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> AppResult<Option<payment::Model>> {
        check_transaction_id(transaction_id.as_deref())?;

        let txn = self.db.begin().await.map_err(db_err)?;

        let Some(current) = PaymentRepository::lock_on(&txn, id).await? else {
            return Ok(None);
        };

        let plan = plan_payment_transition(current.status, status).inspect_err(|e| {
            warn!(payment_id = %id, error = %e, "Rejected payment transition");
        })?;

        if plan == PaymentTransition::Unchanged {
            debug!(payment_id = %id, status = %status, "Payment already settled");
            return Ok(Some(current));
        }

        let user_id = current.user_id.clone();
        let amount = current.amount;
        let mut active: payment::ActiveModel = current.into();

        match plan {
            PaymentTransition::Complete => {
                UserRepository::adjust_balance_on(&txn, &user_id, -amount)
                    .await?
                    .ok_or_else(|| missing("payee", &user_id))?;
                active.status = Set(PaymentStatus::Completed);
                active.completed_at = Set(Some(now()));
            }
            PaymentTransition::Fail => {
                active.status = Set(PaymentStatus::Failed);
            }
            PaymentTransition::StayPending | PaymentTransition::Unchanged => {}
        }
        if let Some(transaction_id) = transaction_id {
            active.transaction_id = Set(Some(transaction_id));
        }

        let payment = PaymentRepository::update_on(&txn, active).await?;
        txn.commit().await.map_err(db_err)?;

        info!(payment_id = %id, user_id = %user_id, status = %payment.status, amount, "Updated payment status");
        Ok(Some(payment))
    }
}
