//! Create download table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Download::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Download::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Download::FileId).string_len(32).not_null())
                    .col(ColumnDef::new(Download::UserId).string_len(32))
                    .col(ColumnDef::new(Download::IpAddress).string_len(64))
                    .col(ColumnDef::new(Download::UserAgent).text())
                    .col(ColumnDef::new(Download::Earnings).big_integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Download::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_download_file")
                            .from(Download::Table, Download::FileId)
                            .to(File::Table, File::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_download_user")
                            .from(Download::Table, Download::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: file_id (per-file download history)
        manager
            .create_index(
                Index::create()
                    .name("idx_download_file_id")
                    .table(Download::Table)
                    .col(Download::FileId)
                    .to_owned(),
            )
            .await?;

        // Index: user_id (downloads made by a user)
        manager
            .create_index(
                Index::create()
                    .name("idx_download_user_id")
                    .table(Download::Table)
                    .col(Download::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Download::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Download {
    Table,
    Id,
    FileId,
    UserId,
    IpAddress,
    UserAgent,
    Earnings,
    CreatedAt,
}

#[derive(Iden)]
enum File {
    Table,
    Id,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
