//! Shared file entity (metadata of an uploaded artifact, not its bytes).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owner user ID
    #[sea_orm(indexed)]
    pub user_id: String,

    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Original file name
    pub file_name: String,

    /// File size in bytes
    pub file_size: i64,

    /// MIME type
    pub content_type: String,

    /// Resolved object storage URL
    pub download_url: String,

    /// Public token used in share links
    #[sea_orm(unique)]
    pub share_token: String,

    /// Free-text tags (JSON array of strings)
    pub tags: Json,

    /// Download count (denormalized)
    #[sea_orm(default_value = 0)]
    pub downloads: i64,

    /// Running average of comment ratings (denormalized)
    pub rating: f64,

    /// Number of ratings behind `rating` (denormalized)
    #[sea_orm(default_value = 0)]
    pub total_ratings: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Tags as plain strings, skipping anything that is not a string.
    #[must_use]
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,

    #[sea_orm(has_many = "super::download::Entity")]
    Download,

    #[sea_orm(has_many = "super::comment::Entity")]
    Comment,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::download::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Download.def()
    }
}

impl Related<super::comment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
