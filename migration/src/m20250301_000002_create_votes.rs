use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

use crate::m20250301_000001_create_influencers::Influencers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Votes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Votes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Votes::InfluencerId).big_integer().not_null())
                    .col(ColumnDef::new(Votes::VoterName).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Votes::EmailHash)
                            .string_len(64) // hex SHA-256
                            .not_null(),
                    )
                    .col(ColumnDef::new(Votes::IpHash).string_len(64).not_null())
                    .col(ColumnDef::new(Votes::Category).string_len(32).null())
                    .col(
                        ColumnDef::new(Votes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_votes_influencer")
                            .from(Votes::Table, Votes::InfluencerId)
                            .to(Influencers::Table, Influencers::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One ballot per voter per creator. The handler's pre-check is only a
        // fast path; this index decides concurrent duplicates.
        manager
            .create_index(
                Index::create()
                    .name("uq_votes_influencer_email")
                    .table(Votes::Table)
                    .col(Votes::InfluencerId)
                    .col(Votes::EmailHash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_votes_created_at")
                    .table(Votes::Table)
                    .col(Votes::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Votes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Votes {
    Table,
    Id,
    InfluencerId,
    VoterName,
    EmailHash,
    IpHash,
    Category,
    CreatedAt,
}
