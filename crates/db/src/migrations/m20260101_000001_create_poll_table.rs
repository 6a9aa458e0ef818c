//! Create the polls table and its query indexes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Polls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Polls::Id)
                            .string_len(24)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Polls::OrgId)
                            .string_len(64)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Polls::AppId)
                            .string_len(64)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Polls::CreatorId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Polls::CreatorName)
                            .string_len(256)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Polls::Question).text().not_null())
                    .col(ColumnDef::new(Polls::Options).json_binary().not_null())
                    .col(ColumnDef::new(Polls::ToMembers).json_binary())
                    .col(ColumnDef::new(Polls::GroupId).string_len(64))
                    .col(ColumnDef::new(Polls::Pin).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Polls::MultiChoice)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Polls::Repeat)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Polls::ShowResults)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Polls::Stadium)
                            .string_len(64)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Polls::GeoFence)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Polls::Status)
                            .string_len(16)
                            .not_null()
                            .default("created"),
                    )
                    .col(ColumnDef::new(Polls::Responses).json_binary())
                    .col(ColumnDef::new(Polls::Results).json_binary())
                    .col(
                        ColumnDef::new(Polls::DateCreated)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Polls::DateUpdated).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Tenancy scope
        manager
            .create_index(
                Index::create()
                    .name("idx_polls_org_id")
                    .table(Polls::Table)
                    .col(Polls::OrgId)
                    .to_owned(),
            )
            .await?;

        // Group scope
        manager
            .create_index(
                Index::create()
                    .name("idx_polls_group_id")
                    .table(Polls::Table)
                    .col(Polls::GroupId)
                    .to_owned(),
            )
            .await?;

        // Status filter
        manager
            .create_index(
                Index::create()
                    .name("idx_polls_status")
                    .table(Polls::Table)
                    .col(Polls::Status)
                    .to_owned(),
            )
            .await?;

        // Pin lookups ordered by lifecycle and recency
        manager
            .create_index(
                Index::create()
                    .name("idx_polls_pin_status_id")
                    .table(Polls::Table)
                    .col(Polls::Pin)
                    .col(Polls::Status)
                    .col(Polls::Id)
                    .to_owned(),
            )
            .await?;

        // "My polls" listings
        manager
            .create_index(
                Index::create()
                    .name("idx_polls_creator_status_id")
                    .table(Polls::Table)
                    .col(Polls::CreatorId)
                    .col(Polls::Status)
                    .col(Polls::Id)
                    .to_owned(),
            )
            .await?;

        // Responded-polls and to-members probes use jsonb containment; a GIN
        // index serves both, standing in for the document store's multikey
        // responses.userid index.
        let db = manager.get_connection();
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_polls_responses_gin ON polls USING GIN (responses)",
        )
        .await?;
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_polls_to_members_gin ON polls USING GIN (to_members)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Polls::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Polls {
    Table,
    Id,
    OrgId,
    AppId,
    CreatorId,
    CreatorName,
    Question,
    Options,
    ToMembers,
    GroupId,
    Pin,
    MultiChoice,
    Repeat,
    ShowResults,
    Stadium,
    GeoFence,
    Status,
    Responses,
    Results,
    DateCreated,
    DateUpdated,
}
