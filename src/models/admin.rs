use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteListQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub influencer_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecordView {
    pub id: i64,
    pub influencer_id: i64,
    pub influencer_name: Option<String>,
    pub voter_name: String,
    /// Leading characters of the email hash; the address itself is never stored.
    pub email_hash_prefix: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePage {
    pub items: Vec<VoteRecordView>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: String,
    pub influencers: u64,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluencerTally {
    pub id: i64,
    pub name: String,
    pub handle: String,
    pub category: String,
    pub is_active: bool,
    pub vote_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub total_votes: u64,
    pub counted_votes: i64,
    pub categories: Vec<CategoryTotal>,
    pub influencers: Vec<InfluencerTally>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub repaired: u64,
}
