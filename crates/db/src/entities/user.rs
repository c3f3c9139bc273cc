//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Identity provider UID (external auth)
    #[sea_orm(unique, nullable)]
    pub external_id: Option<String>,

    /// Local login name
    #[sea_orm(unique, nullable)]
    pub username: Option<String>,

    #[sea_orm(unique, nullable)]
    pub email: Option<String>,

    /// Argon2 PHC string (local credentials only)
    #[serde(skip_serializing)]
    #[sea_orm(nullable)]
    pub password_hash: Option<String>,

    #[sea_orm(nullable)]
    pub display_name: Option<String>,

    #[sea_orm(nullable)]
    pub avatar_url: Option<String>,

    /// Earnings minus completed payouts, smallest currency unit
    #[sea_orm(default_value = 0)]
    pub balance: i64,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file::Entity")]
    File,

    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
