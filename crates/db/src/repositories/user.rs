//! User repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{User, user};
use favisend_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    sea_query::Expr,
};

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find a user by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User: {id}")))
    }

    /// Find a user by identity provider UID.
    pub async fn find_by_external_id(&self, external_id: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::ExternalId.eq(external_id))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find a user by local username.
    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find a user by email address.
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Create a new user.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Add `delta` to a user's balance.
    pub async fn adjust_balance(&self, user_id: &str, delta: i64) -> AppResult<Option<user::Model>> {
        Self::adjust_balance_on(self.db.as_ref(), user_id, delta).await
    }

    /// Add `delta` to a user's balance on the given connection or transaction.
    ///
    /// Single `UPDATE balance = balance + delta` so concurrent adjustments never
    /// lose an update. Returns `None` when the user does not exist.
    pub async fn adjust_balance_on<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        delta: i64,
    ) -> AppResult<Option<user::Model>> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = chrono::Utc::now().into();
        let result = User::update_many()
            .col_expr(
                user::Column::Balance,
                Expr::col(user::Column::Balance).add(delta),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(user_id))
            .exec(conn)
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        User::find_by_id(user_id).one(conn).await.map_err(db_err)
    }

    /// Whether a user exists, on the given connection or transaction.
    pub async fn exists_on<C: ConnectionTrait>(conn: &C, user_id: &str) -> AppResult<bool> {
        Ok(User::find_by_id(user_id)
            .one(conn)
            .await
            .map_err(db_err)?
            .is_some())
    }
}
