use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Influencers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Influencers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Influencers::Name).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Influencers::Handle)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Influencers::Bio).string_len(1000).null())
                    .col(ColumnDef::new(Influencers::PhotoUrl).string_len(512).null())
                    .col(ColumnDef::new(Influencers::VideoUrl).string_len(512).null())
                    .col(ColumnDef::new(Influencers::Hashtags).json().not_null())
                    .col(
                        ColumnDef::new(Influencers::Category)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Influencers::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Influencers::DisplayOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Influencers::VoteCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Influencers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Influencers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_influencers_handle")
                    .table(Influencers::Table)
                    .col(Influencers::Handle)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Listing order for the public page
        manager
            .create_index(
                Index::create()
                    .name("idx_influencers_category_order")
                    .table(Influencers::Table)
                    .col(Influencers::Category)
                    .col(Influencers::DisplayOrder)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Influencers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Influencers {
    Table,
    Id,
    Name,
    Handle,
    Bio,
    PhotoUrl,
    VideoUrl,
    Hashtags,
    Category,
    IsActive,
    DisplayOrder,
    VoteCount,
    CreatedAt,
    UpdatedAt,
}
