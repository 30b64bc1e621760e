//! Initial migration to create the inflow database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_scopes(manager).await?;
        self.create_issues(manager).await?;
        self.create_sync_checkpoints(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncCheckpoints::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Issues::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Scopes::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_scopes(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Scopes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Scopes::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Scopes::Name).string().not_null())
                    .col(ColumnDef::new(Scopes::Host).string().not_null())
                    .col(
                        ColumnDef::new(Scopes::Suspended)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Scopes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_issues(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Issues::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Issues::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Issues::ScopeId).uuid().not_null())
                    .col(ColumnDef::new(Issues::Repo).string().not_null())
                    .col(ColumnDef::new(Issues::Number).big_integer().not_null())
                    .col(ColumnDef::new(Issues::Title).text().not_null())
                    .col(ColumnDef::new(Issues::State).string().not_null())
                    .col(ColumnDef::new(Issues::Author).string().null())
                    .col(
                        ColumnDef::new(Issues::RemoteUpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Issues::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Natural key: re-syncing a page must update in place.
        manager
            .create_index(
                Index::create()
                    .name("idx_issues_scope_repo_number")
                    .table(Issues::Table)
                    .col(Issues::ScopeId)
                    .col(Issues::Repo)
                    .col(Issues::Number)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn create_sync_checkpoints(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncCheckpoints::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncCheckpoints::EntityId).string().not_null())
                    .col(ColumnDef::new(SyncCheckpoints::SyncKind).string().not_null())
                    .col(ColumnDef::new(SyncCheckpoints::Cursor).text().null())
                    .col(
                        ColumnDef::new(SyncCheckpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(SyncCheckpoints::EntityId)
                            .col(SyncCheckpoints::SyncKind),
                    )
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Scopes {
    Table,
    Id,
    Name,
    Host,
    Suspended,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Issues {
    Table,
    Id,
    ScopeId,
    Repo,
    Number,
    Title,
    State,
    Author,
    RemoteUpdatedAt,
    SyncedAt,
}

#[derive(DeriveIden)]
enum SyncCheckpoints {
    Table,
    EntityId,
    SyncKind,
    Cursor,
    UpdatedAt,
}
