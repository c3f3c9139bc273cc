//! Payment repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Payment, payment};
use favisend_common::AppResult;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};

/// Payment repository for database operations.
#[derive(Clone)]
pub struct PaymentRepository {
    db: Arc<DatabaseConnection>,
}

impl PaymentRepository {
    /// Create a new payment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a payment by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<payment::Model>> {
        Payment::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Payout history of a user, newest first.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Vec<payment::Model>> {
        Payment::find()
            .filter(payment::Column::UserId.eq(user_id))
            .order_by_desc(payment::Column::CreatedAt)
            .order_by_desc(payment::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Create a new payment.
    pub async fn create(&self, model: payment::ActiveModel) -> AppResult<payment::Model> {
        model.insert(self.db.as_ref()).await.map_err(db_err)
    }

    /// Load a payment and hold its row lock until the surrounding transaction ends.
    pub async fn lock_on<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<payment::Model>> {
        Payment::find_by_id(id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Update a payment on the given connection or transaction.
    pub async fn update_on<C: ConnectionTrait>(
        conn: &C,
        model: payment::ActiveModel,
    ) -> AppResult<payment::Model> {
        model.update(conn).await.map_err(db_err)
    }
}
