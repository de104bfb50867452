//! Creator ("influencer") entity. `vote_count` is a denormalized counter of
//! the rows in `votes` referencing this creator.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "influencers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "String(StringLen::N(100))")]
    pub name: String,
    #[sea_orm(column_type = "String(StringLen::N(64))", unique)]
    pub handle: String,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
    pub video_url: Option<String>,
    /// JSON array of hashtag strings
    pub hashtags: Json,
    #[sea_orm(column_type = "String(StringLen::N(32))")]
    pub category: String,
    pub is_active: bool,
    pub display_order: i32,
    pub vote_count: i64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vote::Entity")]
    Vote,
}

impl Related<super::vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
