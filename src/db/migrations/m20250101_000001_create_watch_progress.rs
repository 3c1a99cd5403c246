use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::ConnectionTrait;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WatchProgress::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WatchProgress::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WatchProgress::UserId).string().not_null())
                    .col(ColumnDef::new(WatchProgress::ContentId).string().not_null())
                    .col(ColumnDef::new(WatchProgress::UnitId).string().null())
                    .col(
                        ColumnDef::new(WatchProgress::PositionSeconds)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(WatchProgress::DurationSeconds).big_integer().null())
                    .col(
                        ColumnDef::new(WatchProgress::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Episode rows: native conflict target for upserts
        manager
            .create_index(
                Index::create()
                    .name("idx_watch_progress_unit")
                    .table(WatchProgress::Table)
                    .col(WatchProgress::UserId)
                    .col(WatchProgress::ContentId)
                    .col(WatchProgress::UnitId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Title rows: NULL unit_id never collides above, so enforce one row per title here
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_watch_progress_title \
                 ON watch_progress (user_id, content_id) WHERE unit_id IS NULL",
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_watch_progress_recent")
                    .table(WatchProgress::Table)
                    .col(WatchProgress::UserId)
                    .col(WatchProgress::ContentId)
                    .col(WatchProgress::UpdatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WatchProgress::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WatchProgress {
    Table,
    Id,
    UserId,
    ContentId,
    UnitId,
    PositionSeconds,
    DurationSeconds,
    UpdatedAt,
}
