use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "votes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub influencer_id: i64,
    #[sea_orm(column_type = "String(StringLen::N(100))")]
    pub voter_name: String,
    /// Salted SHA-256 of the normalized email, hex encoded
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub email_hash: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub ip_hash: String,
    pub category: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::influencer::Entity",
        from = "Column::InfluencerId",
        to = "super::influencer::Column::Id",
        on_delete = "Cascade"
    )]
    Influencer,
}

impl Related<super::influencer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Influencer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
