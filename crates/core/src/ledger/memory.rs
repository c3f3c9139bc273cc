//! In-memory ledger.
//!
//! Every row sits behind its own mutex. Operations that touch several rows
//! lock them in the order file -> payment -> user, and a table lock is never
//! held while waiting for a row lock.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use favisend_common::{AppError, AppResult, IdGenerator, LedgerConfig};
use favisend_db::entities::{PaymentStatus, comment, download, file, payment, user};
use sea_orm::prelude::DateTimeWithTimeZone;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use validator::Validate;

use super::{
    FileChanges, LedgerStore, MAX_SHARE_TOKEN_ATTEMPTS, NewComment, NewDownload, NewFile,
    NewPayment, NewUser, PaymentTransition, check_transaction_id, download_earnings, next_rating,
    plan_payment_transition, tags_json,
};
use crate::password::hash_password;

/// A row slot. `None` once the row has been deleted.
type Row<T> = Arc<Mutex<Option<T>>>;

struct Table<T> {
    rows: RwLock<HashMap<String, Row<T>>>,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    async fn row(&self, id: &str) -> Option<Row<T>> {
        self.rows.read().await.get(id).cloned()
    }

    async fn get(&self, id: &str) -> Option<T> {
        let row = self.row(id).await?;
        let guard = row.lock().await;
        guard.clone()
    }

    async fn insert(&self, id: String, value: T) {
        self.rows
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(Some(value))));
    }

    async fn remove(&self, id: &str) {
        self.rows.write().await.remove(id);
    }

    /// Copies of every live row.
    async fn snapshot(&self) -> Vec<T> {
        let rows: Vec<Row<T>> = self.rows.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(value) = row.lock().await.clone() {
                out.push(value);
            }
        }
        out
    }
}

/// Unique user identities mapped to user IDs.
#[derive(Default)]
struct UserIndex {
    external_ids: HashMap<String, String>,
    usernames: HashMap<String, String>,
    emails: HashMap<String, String>,
}

impl UserIndex {
    fn claim(&mut self, user: &user::Model) -> AppResult<()> {
        let taken = |map: &HashMap<String, String>, key: &Option<String>| {
            key.as_ref().is_some_and(|k| map.contains_key(k))
        };

        if taken(&self.external_ids, &user.external_id) {
            return Err(AppError::DuplicateKey("external_id already registered".into()));
        }
        if taken(&self.usernames, &user.username) {
            return Err(AppError::DuplicateKey("username already taken".into()));
        }
        if taken(&self.emails, &user.email) {
            return Err(AppError::DuplicateKey("email already registered".into()));
        }

        for (map, key) in [
            (&mut self.external_ids, &user.external_id),
            (&mut self.usernames, &user.username),
            (&mut self.emails, &user.email),
        ] {
            if let Some(key) = key {
                map.insert(key.clone(), user.id.clone());
            }
        }
        Ok(())
    }
}

trait Record {
    fn created_at(&self) -> DateTimeWithTimeZone;
    fn id(&self) -> &str;
}

macro_rules! impl_record {
    ($($model:ty),*) => {
        $(
            impl Record for $model {
                fn created_at(&self) -> DateTimeWithTimeZone {
                    self.created_at
                }

                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

impl_record!(file::Model, download::Model, comment::Model, payment::Model);

/// Newest first; equal timestamps fall back to the larger (later) ID.
fn newest_first<T: Record>(items: &mut [T]) {
    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(a.id()))
    });
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

fn missing(kind: &str, id: &str) -> AppError {
    AppError::DanglingReference(format!("{kind} {id} does not exist"))
}

fn apply_balance(user: &mut user::Model, delta: i64) -> AppResult<()> {
    user.balance = user
        .balance
        .checked_add(delta)
        .ok_or_else(|| AppError::Internal(format!("balance overflow for user {}", user.id)))?;
    user.updated_at = now();
    debug!(user_id = %user.id, delta, balance = user.balance, "Adjusted balance");
    Ok(())
}

/// Process-local ledger. Contents are lost when the process exits.
pub struct MemoryLedger {
    config: LedgerConfig,
    id_gen: IdGenerator,
    users: Table<user::Model>,
    user_index: RwLock<UserIndex>,
    files: Table<file::Model>,
    share_tokens: RwLock<HashMap<String, String>>,
    payments: Table<payment::Model>,
    downloads: RwLock<HashMap<String, download::Model>>,
    comments: RwLock<HashMap<String, comment::Model>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            id_gen: IdGenerator::new(),
            users: Table::new(),
            user_index: RwLock::new(UserIndex::default()),
            files: Table::new(),
            share_tokens: RwLock::new(HashMap::new()),
            payments: Table::new(),
            downloads: RwLock::new(HashMap::new()),
            comments: RwLock::new(HashMap::new()),
        }
    }

    fn limit(&self, limit: Option<u64>) -> usize {
        usize::try_from(limit.unwrap_or(self.config.default_list_limit)).unwrap_or(usize::MAX)
    }

    async fn user_by_index(
        &self,
        pick: impl FnOnce(&UserIndex) -> Option<String>,
    ) -> Option<user::Model> {
        let id = pick(&*self.user_index.read().await)?;
        self.users.get(&id).await
    }

    async fn claim_share_token(&self, file_id: &str) -> AppResult<String> {
        let length = self.config.effective_share_token_length();
        let mut tokens = self.share_tokens.write().await;

        for attempt in 1..=MAX_SHARE_TOKEN_ATTEMPTS {
            let token = self.id_gen.generate_share_token(length);
            if let Entry::Vacant(slot) = tokens.entry(token.clone()) {
                slot.insert(file_id.to_string());
                return Ok(token);
            }
            warn!(file_id = %file_id, attempt, "Share token collision, drawing again");
        }

        Err(AppError::DuplicateKey(
            "could not draw an unused share token".into(),
        ))
    }

    async fn sorted_files(
        &self,
        limit: Option<u64>,
        order: impl Fn(&file::Model, &file::Model) -> Ordering,
    ) -> Vec<file::Model> {
        let mut files = self.files.snapshot().await;
        files.sort_by(|a, b| order(a, b).then_with(|| b.id.cmp(&a.id)));
        files.truncate(self.limit(limit));
        files
    }

    async fn ensure_user(&self, kind: &str, id: &str) -> AppResult<()> {
        if self.users.get(id).await.is_none() {
            return Err(missing(kind, id));
        }
        Ok(())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get_user(&self, id: &str) -> AppResult<Option<user::Model>> {
        Ok(self.users.get(id).await)
    }

    async fn get_user_by_external_id(
        &self,
        external_id: &str,
    ) -> AppResult<Option<user::Model>> {
        Ok(self
            .user_by_index(|index| index.external_ids.get(external_id).cloned())
            .await)
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        Ok(self
            .user_by_index(|index| index.usernames.get(username).cloned())
            .await)
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        Ok(self
            .user_by_index(|index| index.emails.get(email).cloned())
            .await)
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
        let model = user::Model {
            id: self.id_gen.generate(),
            external_id: input.external_id,
            username: input.username,
            email: input.email,
            password_hash,
            display_name: input.display_name,
            avatar_url: input.avatar_url,
            balance: 0,
            created_at: now,
            updated_at: now,
        };

        {
            let mut index = self.user_index.write().await;
            index.claim(&model)?;
            self.users.insert(model.id.clone(), model.clone()).await;
        }

        info!(user_id = %model.id, "Created user");
        Ok(model)
    }

    async fn adjust_user_balance(&self, id: &str, delta: i64) -> AppResult<Option<user::Model>> {
        let Some(row) = self.users.row(id).await else {
            return Ok(None);
        };
        let mut guard = row.lock().await;
        let Some(user) = guard.as_mut() else {
            return Ok(None);
        };

        apply_balance(user, delta)?;
        Ok(Some(user.clone()))
    }

    async fn get_file(&self, id: &str) -> AppResult<Option<file::Model>> {
        Ok(self.files.get(id).await)
    }

    async fn get_file_by_share_token(&self, token: &str) -> AppResult<Option<file::Model>> {
        let id = self.share_tokens.read().await.get(token).cloned();
        match id {
            Some(id) => Ok(self.files.get(&id).await),
            None => Ok(None),
        }
    }

    async fn list_files_by_owner(&self, user_id: &str) -> AppResult<Vec<file::Model>> {
        let mut files: Vec<_> = self
            .files
            .snapshot()
            .await
            .into_iter()
            .filter(|f| f.user_id == user_id)
            .collect();
        newest_first(&mut files);
        Ok(files)
    }

    async fn create_file(&self, input: NewFile, owner_id: &str) -> AppResult<file::Model> {
        input.validate()?;
        self.ensure_user("owner", owner_id).await?;

        let id = self.id_gen.generate();
        let share_token = self.claim_share_token(&id).await?;
        let now = now();
        let model = file::Model {
            id: id.clone(),
            user_id: owner_id.to_string(),
            title: input.title,
            description: input.description,
            file_name: input.file_name,
            file_size: input.file_size,
            content_type: input.content_type,
            download_url: input.download_url,
            share_token,
            tags: tags_json(&input.tags),
            downloads: 0,
            rating: 0.0,
            total_ratings: 0,
            created_at: now,
            updated_at: now,
        };

        self.files.insert(id, model.clone()).await;

        info!(file_id = %model.id, user_id = %owner_id, "Created file");
        Ok(model)
    }

    async fn update_file(
        &self,
        id: &str,
        changes: FileChanges,
    ) -> AppResult<Option<file::Model>> {
        changes.validate()?;

        let Some(row) = self.files.row(id).await else {
            return Ok(None);
        };
        let mut guard = row.lock().await;
        let Some(file) = guard.as_mut() else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            file.title = title;
        }
        if let Some(description) = changes.description {
            file.description = description;
        }
        if let Some(file_name) = changes.file_name {
            file.file_name = file_name;
        }
        if let Some(file_size) = changes.file_size {
            file.file_size = file_size;
        }
        if let Some(content_type) = changes.content_type {
            file.content_type = content_type;
        }
        if let Some(download_url) = changes.download_url {
            file.download_url = download_url;
        }
        if let Some(tags) = changes.tags {
            file.tags = tags_json(&tags);
        }
        file.updated_at = now();

        debug!(file_id = %id, "Updated file");
        Ok(Some(file.clone()))
    }

    async fn delete_file(&self, id: &str) -> AppResult<bool> {
        let Some(row) = self.files.row(id).await else {
            return Ok(false);
        };
        let mut guard = row.lock().await;
        let Some(file) = guard.take() else {
            return Ok(false);
        };

        self.files.remove(id).await;
        self.share_tokens.write().await.remove(&file.share_token);

        let removed_downloads = {
            let mut downloads = self.downloads.write().await;
            let before = downloads.len();
            downloads.retain(|_, d| d.file_id != id);
            before - downloads.len()
        };
        let removed_comments = {
            let mut comments = self.comments.write().await;
            let before = comments.len();
            comments.retain(|_, c| c.file_id != id);
            before - comments.len()
        };

        info!(file_id = %id, removed_downloads, removed_comments, "Deleted file");
        Ok(true)
    }

    async fn list_popular_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>> {
        Ok(self
            .sorted_files(limit, |a, b| b.downloads.cmp(&a.downloads))
            .await)
    }

    async fn list_recent_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>> {
        Ok(self
            .sorted_files(limit, |a, b| b.created_at.cmp(&a.created_at))
            .await)
    }

    async fn list_top_rated_files(&self, limit: Option<u64>) -> AppResult<Vec<file::Model>> {
        Ok(self
            .sorted_files(limit, |a, b| b.rating.total_cmp(&a.rating))
            .await)
    }

    async fn record_download(&self, input: NewDownload) -> AppResult<download::Model> {
        input.validate()?;
        if let Some(user_id) = &input.user_id {
            self.ensure_user("downloader", user_id).await?;
        }
        let earnings = download_earnings(&self.config, &input);

        let file_row = self
            .files
            .row(&input.file_id)
            .await
            .ok_or_else(|| missing("file", &input.file_id))?;
        let mut file_guard = file_row.lock().await;
        let file = file_guard
            .as_mut()
            .ok_or_else(|| missing("file", &input.file_id))?;

        if earnings != 0 {
            let owner_row = self
                .users
                .row(&file.user_id)
                .await
                .ok_or_else(|| missing("owner", &file.user_id))?;
            let mut owner_guard = owner_row.lock().await;
            let owner = owner_guard
                .as_mut()
                .ok_or_else(|| missing("owner", &file.user_id))?;
            apply_balance(owner, earnings)?;
        }
        file.downloads += 1;

        let record = download::Model {
            id: self.id_gen.generate(),
            file_id: input.file_id,
            user_id: input.user_id,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            earnings,
            created_at: now(),
        };
        self.downloads
            .write()
            .await
            .insert(record.id.clone(), record.clone());

        info!(
            file_id = %record.file_id,
            owner_id = %file.user_id,
            earnings,
            downloads = file.downloads,
            "Recorded download"
        );
        Ok(record)
    }

    async fn get_download(&self, id: &str) -> AppResult<Option<download::Model>> {
        Ok(self.downloads.read().await.get(id).cloned())
    }

    async fn list_file_downloads(&self, file_id: &str) -> AppResult<Vec<download::Model>> {
        let mut downloads: Vec<_> = self
            .downloads
            .read()
            .await
            .values()
            .filter(|d| d.file_id == file_id)
            .cloned()
            .collect();
        newest_first(&mut downloads);
        Ok(downloads)
    }

    async fn list_user_downloads(&self, user_id: &str) -> AppResult<Vec<download::Model>> {
        let owned: Vec<String> = self
            .list_files_by_owner(user_id)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();

        let mut downloads: Vec<_> = self
            .downloads
            .read()
            .await
            .values()
            .filter(|d| owned.contains(&d.file_id))
            .cloned()
            .collect();
        newest_first(&mut downloads);
        Ok(downloads)
    }

    async fn list_downloads_made_by(&self, user_id: &str) -> AppResult<Vec<download::Model>> {
        let mut downloads: Vec<_> = self
            .downloads
            .read()
            .await
            .values()
            .filter(|d| d.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        newest_first(&mut downloads);
        Ok(downloads)
    }

    async fn get_comment(&self, id: &str) -> AppResult<Option<comment::Model>> {
        Ok(self.comments.read().await.get(id).cloned())
    }

    async fn list_file_comments(&self, file_id: &str) -> AppResult<Vec<comment::Model>> {
        let mut comments: Vec<_> = self
            .comments
            .read()
            .await
            .values()
            .filter(|c| c.file_id == file_id)
            .cloned()
            .collect();
        newest_first(&mut comments);
        Ok(comments)
    }

    async fn create_comment(&self, input: NewComment) -> AppResult<comment::Model> {
        input.validate()?;
        self.ensure_user("commenter", &input.user_id).await?;

        let file_row = self
            .files
            .row(&input.file_id)
            .await
            .ok_or_else(|| missing("file", &input.file_id))?;
        let mut file_guard = file_row.lock().await;
        let file = file_guard
            .as_mut()
            .ok_or_else(|| missing("file", &input.file_id))?;

        let (rating, total_ratings) = next_rating(file.rating, file.total_ratings, input.rating);
        file.rating = rating;
        file.total_ratings = total_ratings;

        let record = comment::Model {
            id: self.id_gen.generate(),
            file_id: input.file_id,
            user_id: input.user_id,
            body: input.body,
            rating: input.rating,
            created_at: now(),
        };
        self.comments
            .write()
            .await
            .insert(record.id.clone(), record.clone());

        debug!(file_id = %record.file_id, rating, total_ratings, "Recorded comment");
        Ok(record)
    }

    async fn create_payment(&self, input: NewPayment) -> AppResult<payment::Model> {
        input.validate()?;
        if let Some(requested) = input.status.filter(|s| *s != PaymentStatus::Pending) {
            debug!(%requested, "New payments start pending, ignoring requested status");
        }
        self.ensure_user("payee", &input.user_id).await?;

        let model = payment::Model {
            id: self.id_gen.generate(),
            user_id: input.user_id,
            amount: input.amount,
            status: PaymentStatus::Pending,
            payment_method: input.payment_method,
            transaction_id: input.transaction_id,
            details: input.details,
            created_at: now(),
            completed_at: None,
        };
        self.payments.insert(model.id.clone(), model.clone()).await;

        info!(payment_id = %model.id, user_id = %model.user_id, amount = model.amount, "Created payment");
        Ok(model)
    }

    async fn get_payment(&self, id: &str) -> AppResult<Option<payment::Model>> {
        Ok(self.payments.get(id).await)
    }

    async fn list_user_payments(&self, user_id: &str) -> AppResult<Vec<payment::Model>> {
        let mut payments: Vec<_> = self
            .payments
            .snapshot()
            .await
            .into_iter()
            .filter(|p| p.user_id == user_id)
            .collect();
        newest_first(&mut payments);
        Ok(payments)
    }

    async fn update_payment_status(
        &self,
        id: &str,
        status: PaymentStatus,
        transaction_id: Option<String>,
    ) -> AppResult<Option<payment::Model>> {
        check_transaction_id(transaction_id.as_deref())?;

        let Some(row) = self.payments.row(id).await else {
            return Ok(None);
        };
        let mut guard = row.lock().await;
        let Some(payment) = guard.as_mut() else {
            return Ok(None);
        };

        let plan = plan_payment_transition(payment.status, status).inspect_err(|e| {
            warn!(payment_id = %id, error = %e, "Rejected payment transition");
        })?;

        match plan {
            PaymentTransition::Unchanged => {
                debug!(payment_id = %id, status = %status, "Payment already settled");
                return Ok(Some(payment.clone()));
            }
            PaymentTransition::StayPending => {}
            PaymentTransition::Complete => {
                let payee_row = self
                    .users
                    .row(&payment.user_id)
                    .await
                    .ok_or_else(|| missing("payee", &payment.user_id))?;
                let mut payee_guard = payee_row.lock().await;
                let payee = payee_guard
                    .as_mut()
                    .ok_or_else(|| missing("payee", &payment.user_id))?;
                apply_balance(payee, -payment.amount)?;

                payment.status = PaymentStatus::Completed;
                payment.completed_at = Some(now());
                info!(payment_id = %id, user_id = %payment.user_id, amount = payment.amount, "Completed payment");
            }
            PaymentTransition::Fail => {
                payment.status = PaymentStatus::Failed;
                info!(payment_id = %id, user_id = %payment.user_id, "Payment failed");
            }
        }

        if let Some(transaction_id) = transaction_id {
            payment.transaction_id = Some(transaction_id);
        }
        Ok(Some(payment.clone()))
    }
}
