//! Create `file` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(File::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(File::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(File::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(File::Title).string_len(256).not_null())
                    .col(ColumnDef::new(File::Description).text())
                    .col(ColumnDef::new(File::FileName).string_len(256).not_null())
                    .col(ColumnDef::new(File::FileSize).big_integer().not_null())
                    .col(ColumnDef::new(File::ContentType).string_len(128).not_null())
                    .col(ColumnDef::new(File::DownloadUrl).string_len(1024).not_null())
                    .col(ColumnDef::new(File::ShareToken).string_len(64).not_null())
                    .col(ColumnDef::new(File::Tags).json_binary().not_null().default("[]"))
                    .col(ColumnDef::new(File::Downloads).big_integer().not_null().default(0))
                    .col(ColumnDef::new(File::Rating).double().not_null().default(0.0))
                    .col(ColumnDef::new(File::TotalRatings).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(File::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(File::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_file_user")
                            .from(File::Table, File::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: share_token (public share links)
        manager
            .create_index(
                Index::create()
                    .name("idx_file_share_token")
                    .table(File::Table)
                    .col(File::ShareToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: user_id (for listing a user's files)
        manager
            .create_index(
                Index::create()
                    .name("idx_file_user_id")
                    .table(File::Table)
                    .col(File::UserId)
                    .to_owned(),
            )
            .await?;

        // Indexes for the popular / recent / top rated listings
        for (name, column) in [
            ("idx_file_downloads", File::Downloads),
            ("idx_file_created_at", File::CreatedAt),
            ("idx_file_rating", File::Rating),
        ] {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(File::Table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(File::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum File {
    Table,
    Id,
    UserId,
    Title,
    Description,
    FileName,
    FileSize,
    ContentType,
    DownloadUrl,
    ShareToken,
    Tags,
    Downloads,
    Rating,
    TotalRatings,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
