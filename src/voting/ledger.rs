use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, Query, QueryStatementBuilder, SimpleExpr};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
    SqlErr,
};
use tracing::info;

use crate::entities::{influencer, vote};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("a vote for this candidate and email already exists")]
    Duplicate,
    #[error("candidate {0} does not exist")]
    MissingCandidate(i64),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl LedgerError {
    fn from_insert(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Self::Duplicate,
            _ => Self::Database(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBallot {
    pub influencer_id: i64,
    pub voter_name: String,
    pub email_hash: String,
    pub ip_hash: String,
    pub category: Option<String>,
}

/// Storage operations the vote pipeline depends on.
#[async_trait]
pub trait BallotStore: Send + Sync {
    async fn find_candidate(&self, id: i64) -> Result<Option<influencer::Model>, LedgerError>;

    async fn has_voted(&self, influencer_id: i64, email_hash: &str) -> Result<bool, LedgerError>;

    /// Inserts the ballot. A uniqueness violation maps to [`LedgerError::Duplicate`].
    async fn record_ballot(&self, ballot: NewBallot) -> Result<vote::Model, LedgerError>;

    /// Single store-side `vote_count = vote_count + 1`.
    async fn increment_vote_count(&self, influencer_id: i64) -> Result<(), LedgerError>;

    async fn vote_count(&self, influencer_id: i64) -> Result<Option<i64>, LedgerError>;
}

#[derive(Clone)]
pub struct VoteLedger {
    database: DatabaseConnection,
}

impl VoteLedger {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    /// Rewrites every `vote_count` that disagrees with the vote table.
    /// Each fix recounts inside the UPDATE so concurrent votes are not lost.
    pub async fn reconcile_counts(&self) -> Result<u64, LedgerError> {
        let actual: HashMap<i64, i64> = vote::Entity::find()
            .select_only()
            .column(vote::Column::InfluencerId)
            .column_as(vote::Column::Id.count(), "total")
            .group_by(vote::Column::InfluencerId)
            .into_tuple::<(i64, i64)>()
            .all(&self.database)
            .await?
            .into_iter()
            .collect();

        let stored = influencer::Entity::find()
            .select_only()
            .column(influencer::Column::Id)
            .column(influencer::Column::VoteCount)
            .into_tuple::<(i64, i64)>()
            .all(&self.database)
            .await?;

        let mut repaired = 0_u64;
        for (id, vote_count) in stored {
            let expected = actual.get(&id).copied().unwrap_or(0);
            if expected == vote_count {
                continue;
            }

            let recount = Query::select()
                .expr(Expr::col((vote::Entity, vote::Column::Id)).count())
                .from(vote::Entity)
                .and_where(
                    Expr::col((vote::Entity, vote::Column::InfluencerId))
                        .equals((influencer::Entity, influencer::Column::Id)),
                )
                .to_owned();

            let result = influencer::Entity::update_many()
                .col_expr(
                    influencer::Column::VoteCount,
                    SimpleExpr::SubQuery(None, Box::new(recount.into_sub_query_statement())),
                )
                .filter(influencer::Column::Id.eq(id))
                .exec(&self.database)
                .await?;

            if result.rows_affected > 0 {
                info!("Reconciled vote_count for influencer {id}: {vote_count} -> {expected}");
                repaired += 1;
            }
        }

        Ok(repaired)
    }

    pub async fn total_votes(&self) -> Result<u64, LedgerError> {
        Ok(vote::Entity::find().count(&self.database).await?)
    }
}

#[async_trait]
impl BallotStore for VoteLedger {
    async fn find_candidate(&self, id: i64) -> Result<Option<influencer::Model>, LedgerError> {
        Ok(influencer::Entity::find_by_id(id)
            .one(&self.database)
            .await?)
    }

    async fn has_voted(&self, influencer_id: i64, email_hash: &str) -> Result<bool, LedgerError> {
        let existing = vote::Entity::find()
            .filter(vote::Column::InfluencerId.eq(influencer_id))
            .filter(vote::Column::EmailHash.eq(email_hash))
            .count(&self.database)
            .await?;
        Ok(existing > 0)
    }

    async fn record_ballot(&self, ballot: NewBallot) -> Result<vote::Model, LedgerError> {
        let model = vote::ActiveModel {
            id: NotSet,
            influencer_id: Set(ballot.influencer_id),
            voter_name: Set(ballot.voter_name),
            email_hash: Set(ballot.email_hash),
            ip_hash: Set(ballot.ip_hash),
            category: Set(ballot.category),
            created_at: Set(Utc::now().fixed_offset()),
        };

        vote::Entity::insert(model)
            .exec_with_returning(&self.database)
            .await
            .map_err(LedgerError::from_insert)
    }

    async fn increment_vote_count(&self, influencer_id: i64) -> Result<(), LedgerError> {
        let result = influencer::Entity::update_many()
            .col_expr(
                influencer::Column::VoteCount,
                Expr::col(influencer::Column::VoteCount).add(1),
            )
            .filter(influencer::Column::Id.eq(influencer_id))
            .exec(&self.database)
            .await?;

        if result.rows_affected == 0 {
            return Err(LedgerError::MissingCandidate(influencer_id));
        }
        Ok(())
    }

    async fn vote_count(&self, influencer_id: i64) -> Result<Option<i64>, LedgerError> {
        Ok(influencer::Entity::find_by_id(influencer_id)
            .select_only()
            .column(influencer::Column::VoteCount)
            .into_tuple::<i64>()
            .one(&self.database)
            .await?)
    }
}
