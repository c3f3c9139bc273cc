//! Shared file repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{File, file};
use favisend_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, sea_query::Expr,
};

/// File repository for database operations.
#[derive(Clone)]
pub struct FileRepository {
    db: Arc<DatabaseConnection>,
}

impl FileRepository {
    /// Create a new file repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a file by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<file::Model>> {
        File::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Get a file by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<file::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File: {id}")))
    }

    /// Find a file by its public share token.
    pub async fn find_by_share_token(&self, token: &str) -> AppResult<Option<file::Model>> {
        File::find()
            .filter(file::Column::ShareToken.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Get all files owned by a user, newest first.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Vec<file::Model>> {
        File::find()
            .filter(file::Column::UserId.eq(user_id))
            .order_by_desc(file::Column::CreatedAt)
            .order_by_desc(file::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Most downloaded files.
    pub async fn find_popular(&self, limit: u64) -> AppResult<Vec<file::Model>> {
        self.find_ordered(file::Column::Downloads, limit).await
    }

    /// Most recently uploaded files.
    pub async fn find_recent(&self, limit: u64) -> AppResult<Vec<file::Model>> {
        self.find_ordered(file::Column::CreatedAt, limit).await
    }

    /// Best rated files.
    pub async fn find_top_rated(&self, limit: u64) -> AppResult<Vec<file::Model>> {
        self.find_ordered(file::Column::Rating, limit).await
    }

    async fn find_ordered(&self, column: file::Column, limit: u64) -> AppResult<Vec<file::Model>> {
        File::find()
            .order_by_desc(column)
            .order_by_desc(file::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Create a new file.
    pub async fn create(&self, model: file::ActiveModel) -> AppResult<file::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Update a file.
    pub async fn update(&self, model: file::ActiveModel) -> AppResult<file::Model> {
        model.update(self.db.as_ref()).await.map_err(db_err)
    }

    /// Load a file and hold its row lock until the surrounding transaction ends.
    pub async fn lock_on<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<Option<file::Model>> {
        File::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Increment the download counter (single UPDATE query, no fetch).
    pub async fn increment_downloads_on<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        File::update_many()
            .col_expr(
                file::Column::Downloads,
                Expr::col(file::Column::Downloads).add(1),
            )
            .filter(file::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Store a recomputed rating aggregate.
    pub async fn set_rating_on<C: ConnectionTrait>(
        conn: &C,
        locked: file::Model,
        rating: f64,
        total_ratings: i32,
    ) -> AppResult<file::Model> {
        let mut active: file::ActiveModel = locked.into();
        active.rating = Set(rating);
        active.total_ratings = Set(total_ratings);
        active.update(conn).await.map_err(db_err)
    }

    /// Delete a file row. Returns whether a row was removed.
    pub async fn delete_on<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<bool> {
        let result = File::delete_by_id(id).exec(conn).await.map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }
}
