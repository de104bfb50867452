use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::influencer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluencerView {
    pub id: i64,
    pub name: String,
    pub handle: String,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
    pub video_url: Option<String>,
    pub hashtags: Vec<String>,
    pub category: String,
    pub display_order: i32,
    pub vote_count: i64,
}

impl From<influencer::Model> for InfluencerView {
    fn from(model: influencer::Model) -> Self {
        Self {
            hashtags: hashtags_from_json(&model.hashtags),
            id: model.id,
            name: model.name,
            handle: model.handle,
            bio: model.bio,
            photo_url: model.photo_url,
            video_url: model.video_url,
            category: model.category,
            display_order: model.display_order,
            vote_count: model.vote_count,
        }
    }
}

/// Admin view: the public fields plus state hidden from voters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminInfluencerView {
    #[serde(flatten)]
    pub public: InfluencerView,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<influencer::Model> for AdminInfluencerView {
    fn from(model: influencer::Model) -> Self {
        let is_active = model.is_active;
        let created_at = model.created_at.with_timezone(&Utc);
        let updated_at = model.updated_at.with_timezone(&Utc);
        Self {
            public: InfluencerView::from(model),
            is_active,
            created_at,
            updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluencerUpsertRequest {
    pub name: String,
    pub handle: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub category: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i32,
}

const fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQuery {
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    pub ends_at: DateTime<Utc>,
    pub open: bool,
    pub categories: Vec<&'static str>,
}

pub fn hashtags_from_json(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}
