use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::catalog::{CATEGORIES, normalize_category};
use crate::entities::influencer;
use crate::models::influencer::{CampaignView, InfluencerView, ListingQuery};
use crate::state::AppState;

use super::HttpError;

const ALL_CATEGORIES_KEY: &str = "all";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_influencers))
        .route("/{id}", get(get_influencer))
}

async fn list_influencers(
    Query(query): Query<ListingQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<InfluencerView>>, HttpError> {
    let category = match query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
    {
        Some(raw) => {
            Some(normalize_category(raw).map_err(|err| HttpError::bad_request(err.to_string()))?)
        }
        None => None,
    };

    let cache_key = category.unwrap_or(ALL_CATEGORIES_KEY).to_string();
    if let Some(cached) = state.cache.listings.get(&cache_key).await {
        return Ok(Json((*cached).clone()));
    }

    let mut select = influencer::Entity::find().filter(influencer::Column::IsActive.eq(true));
    if let Some(category) = category {
        select = select.filter(influencer::Column::Category.eq(category));
    }

    let rows = select
        .order_by_asc(influencer::Column::DisplayOrder)
        .order_by_asc(influencer::Column::Id)
        .all(&state.database)
        .await
        .map_err(HttpError::internal)?;

    let views: Vec<InfluencerView> = rows.into_iter().map(InfluencerView::from).collect();

    state
        .cache
        .listings
        .insert(cache_key, Arc::new(views.clone()))
        .await;

    Ok(Json(views))
}

async fn get_influencer(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<InfluencerView>, HttpError> {
    let model = influencer::Entity::find_by_id(id)
        .filter(influencer::Column::IsActive.eq(true))
        .one(&state.database)
        .await
        .map_err(HttpError::internal)?
        .ok_or_else(|| HttpError::not_found(format!("Influencer {id} not found")))?;

    Ok(Json(InfluencerView::from(model)))
}

/// Reports the configured end date. Vote intake itself does not enforce it.
pub(super) async fn campaign_status(State(state): State<AppState>) -> Json<CampaignView> {
    Json(CampaignView {
        ends_at: state.campaign.ends_at,
        open: state.campaign.is_open(Utc::now()),
        categories: CATEGORIES.to_vec(),
    })
}
