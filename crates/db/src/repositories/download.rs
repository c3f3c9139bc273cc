//! Download repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Download, File, download, file};
use favisend_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};

/// Download repository for database operations.
#[derive(Clone)]
pub struct DownloadRepository {
    db: Arc<DatabaseConnection>,
}

impl DownloadRepository {
    /// Create a new download repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a download by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<download::Model>> {
        Download::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Downloads of one file, newest first.
    pub async fn find_by_file(&self, file_id: &str) -> AppResult<Vec<download::Model>> {
        Download::find()
            .filter(download::Column::FileId.eq(file_id))
            .order_by_desc(download::Column::CreatedAt)
            .order_by_desc(download::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Downloads of every file owned by `owner_id`, newest first.
    pub async fn find_by_file_owner(&self, owner_id: &str) -> AppResult<Vec<download::Model>> {
        Download::find()
            .inner_join(File)
            .filter(file::Column::UserId.eq(owner_id))
            .order_by_desc(download::Column::CreatedAt)
            .order_by_desc(download::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Downloads performed by a user, newest first.
    pub async fn find_by_downloader(&self, user_id: &str) -> AppResult<Vec<download::Model>> {
        Download::find()
            .filter(download::Column::UserId.eq(user_id))
            .order_by_desc(download::Column::CreatedAt)
            .order_by_desc(download::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Insert a download record on the given connection or transaction.
    pub async fn insert_on<C: ConnectionTrait>(
        conn: &C,
        model: download::ActiveModel,
    ) -> AppResult<download::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Delete every download of a file.
    pub async fn delete_by_file_on<C: ConnectionTrait>(conn: &C, file_id: &str) -> AppResult<u64> {
        let result = Download::delete_many()
            .filter(download::Column::FileId.eq(file_id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }
}
