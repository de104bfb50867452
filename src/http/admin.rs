//! Admin back-office endpoints.
//!
//! Everything except `/login` and `/logout` requires the `admin_session`
//! cookie to equal the configured session token. Admin writes never touch
//! `vote_count`; only the vote pipeline and the reconciler do.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    SqlErr,
};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::catalog::{
    canonicalize_bio, canonicalize_handle, canonicalize_hashtags, canonicalize_media_url,
    canonicalize_name, normalize_category,
};
use crate::config::DeployEnvironment;
use crate::entities::{influencer, vote};
use crate::models::admin::{
    CategoryTotal, InfluencerTally, LoginRequest, ReconcileResponse, StatsView, VoteListQuery,
    VotePage, VoteRecordView,
};
use crate::models::influencer::{AdminInfluencerView, InfluencerUpsertRequest};
use crate::state::AppState;
use crate::voting::client_ip::ClientHints;
use crate::voting::hashing::hash_prefix;
use crate::voting::rate_limit::{RateLimitAction, RateLimitDecision, retry_after_seconds};

use super::HttpError;

pub const SESSION_COOKIE: &str = "admin_session";
const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 200;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/influencers", get(list_influencers).post(create_influencer))
        .route(
            "/influencers/{id}",
            put(update_influencer).delete(delete_influencer),
        )
        .route("/votes", get(list_votes))
        .route("/stats", get(get_stats))
        .route("/reconcile", post(reconcile_counts))
        .route_layer(middleware::from_fn_with_state(state, require_admin_session));

    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(protected)
}

async fn require_admin_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let jar = CookieJar::from_headers(request.headers());
    let authorized = jar
        .get(SESSION_COOKIE)
        .is_some_and(|cookie| constant_time_eq(cookie.value_trimmed(), &state.admin.session_token));

    if !authorized {
        return Err(HttpError::new(
            StatusCode::UNAUTHORIZED,
            "Admin session required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

async fn login(
    State(state): State<AppState>,
    hints: ClientHints,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, StatusCode), HttpError> {
    let client = hints.resolve(state.environment);
    if let RateLimitDecision::Limited { retry_after } =
        state.limiter.check(&client, RateLimitAction::AdminLogin)
    {
        warn!("Admin login rate limited for client {client}");
        return Err(HttpError::new(
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "Too many login attempts. Retry in {} seconds.",
                retry_after_seconds(retry_after)
            ),
        ));
    }

    let username_ok = constant_time_eq(request.username.trim(), state.admin.username.trim());
    let password_ok = constant_time_eq(&request.password, &state.admin.password);
    if !(username_ok && password_ok) {
        warn!("Failed admin login from client {client}");
        return Err(HttpError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials".to_string(),
        ));
    }

    info!("Admin login from client {client}");
    let cookie = session_cookie(
        state.admin.session_token.clone(),
        state.admin.session_ttl_hours,
        state.environment,
    );
    Ok((jar.add(cookie), StatusCode::NO_CONTENT))
}

async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
}

async fn list_influencers(
    State(state): State<AppState>,
) -> Result<Json<Vec<AdminInfluencerView>>, HttpError> {
    let rows = influencer::Entity::find()
        .order_by_asc(influencer::Column::Category)
        .order_by_asc(influencer::Column::DisplayOrder)
        .order_by_asc(influencer::Column::Id)
        .all(&state.database)
        .await
        .map_err(HttpError::internal)?;

    Ok(Json(rows.into_iter().map(AdminInfluencerView::from).collect()))
}

async fn create_influencer(
    State(state): State<AppState>,
    Json(request): Json<InfluencerUpsertRequest>,
) -> Result<(StatusCode, Json<AdminInfluencerView>), HttpError> {
    let fields = InfluencerFields::validate(&request)?;
    let now = Utc::now().fixed_offset();

    let model = influencer::ActiveModel {
        id: NotSet,
        name: Set(fields.name),
        handle: Set(fields.handle),
        bio: Set(fields.bio),
        photo_url: Set(fields.photo_url),
        video_url: Set(fields.video_url),
        hashtags: Set(serde_json::Value::from(fields.hashtags)),
        category: Set(fields.category.to_string()),
        is_active: Set(request.is_active),
        display_order: Set(request.display_order),
        vote_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = influencer::Entity::insert(model)
        .exec_with_returning(&state.database)
        .await
        .map_err(write_error)?;

    state.cache.invalidate_listings();
    info!("Admin created influencer {} (@{})", created.id, created.handle);

    Ok((StatusCode::CREATED, Json(AdminInfluencerView::from(created))))
}

async fn update_influencer(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<InfluencerUpsertRequest>,
) -> Result<Json<AdminInfluencerView>, HttpError> {
    let fields = InfluencerFields::validate(&request)?;

    let existing = influencer::Entity::find_by_id(id)
        .one(&state.database)
        .await
        .map_err(HttpError::internal)?
        .ok_or_else(|| HttpError::not_found(format!("Influencer {id} not found")))?;

    let mut model: influencer::ActiveModel = existing.into();
    model.name = Set(fields.name);
    model.handle = Set(fields.handle);
    model.bio = Set(fields.bio);
    model.photo_url = Set(fields.photo_url);
    model.video_url = Set(fields.video_url);
    model.hashtags = Set(serde_json::Value::from(fields.hashtags));
    model.category = Set(fields.category.to_string());
    model.is_active = Set(request.is_active);
    model.display_order = Set(request.display_order);
    model.updated_at = Set(Utc::now().fixed_offset());

    let updated = model
        .update(&state.database)
        .await
        .map_err(write_error)?;

    state.cache.invalidate_listings();
    info!("Admin updated influencer {id}");

    Ok(Json(AdminInfluencerView::from(updated)))
}

async fn delete_influencer(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, HttpError> {
    let result = influencer::Entity::delete_by_id(id)
        .exec(&state.database)
        .await
        .map_err(HttpError::internal)?;

    if result.rows_affected == 0 {
        return Err(HttpError::not_found(format!("Influencer {id} not found")));
    }

    state.cache.invalidate_listings();
    info!("Admin deleted influencer {id} and its votes");

    Ok(StatusCode::NO_CONTENT)
}

async fn list_votes(
    Query(query): Query<VoteListQuery>,
    State(state): State<AppState>,
) -> Result<Json<VotePage>, HttpError> {
    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(HttpError::bad_request("page starts at 1"));
    }
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err(HttpError::bad_request("pageSize must be positive"));
    }
    let page_size = page_size.min(MAX_PAGE_SIZE);

    let mut select = vote::Entity::find().find_also_related(influencer::Entity);
    if let Some(influencer_id) = query.influencer_id {
        select = select.filter(vote::Column::InfluencerId.eq(influencer_id));
    }

    let paginator = select
        .order_by_desc(vote::Column::CreatedAt)
        .order_by_desc(vote::Column::Id)
        .paginate(&state.database, page_size);

    let totals = paginator
        .num_items_and_pages()
        .await
        .map_err(HttpError::internal)?;
    let last_page = totals.number_of_pages.max(1);
    if page > last_page {
        return Err(HttpError::bad_request(format!(
            "page {page} is past the last page ({last_page})"
        )));
    }
    let rows = paginator
        .fetch_page(page - 1)
        .await
        .map_err(HttpError::internal)?;

    let items: Vec<VoteRecordView> = rows
        .into_iter()
        .map(|(ballot, creator)| VoteRecordView {
            id: ballot.id,
            influencer_id: ballot.influencer_id,
            influencer_name: creator.map(|creator| creator.name),
            voter_name: ballot.voter_name,
            email_hash_prefix: hash_prefix(&ballot.email_hash).to_string(),
            category: ballot.category,
            created_at: ballot.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(Json(VotePage {
        items,
        page,
        page_size,
        total: totals.number_of_items,
        total_pages: totals.number_of_pages,
    }))
}

async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsView>, HttpError> {
    let total_votes = state
        .ledger
        .total_votes()
        .await
        .map_err(HttpError::internal)?;

    let creators = influencer::Entity::find()
        .order_by_desc(influencer::Column::VoteCount)
        .order_by_asc(influencer::Column::Id)
        .all(&state.database)
        .await
        .map_err(HttpError::internal)?;

    let mut by_category: BTreeMap<String, CategoryTotal> = BTreeMap::new();
    for creator in &creators {
        let entry = by_category
            .entry(creator.category.clone())
            .or_insert_with(|| CategoryTotal {
                category: creator.category.clone(),
                influencers: 0,
                votes: 0,
            });
        entry.influencers += 1;
        entry.votes = entry.votes.saturating_add(creator.vote_count);
    }

    let counted_votes = creators
        .iter()
        .fold(0_i64, |sum, creator| sum.saturating_add(creator.vote_count));

    let influencers = creators
        .into_iter()
        .map(|creator| InfluencerTally {
            id: creator.id,
            name: creator.name,
            handle: creator.handle,
            category: creator.category,
            is_active: creator.is_active,
            vote_count: creator.vote_count,
        })
        .collect();

    Ok(Json(StatsView {
        total_votes,
        counted_votes,
        categories: by_category.into_values().collect(),
        influencers,
    }))
}

async fn reconcile_counts(
    State(state): State<AppState>,
) -> Result<Json<ReconcileResponse>, HttpError> {
    let repaired = state
        .ledger
        .reconcile_counts()
        .await
        .map_err(HttpError::internal)?;
    if repaired > 0 {
        state.cache.invalidate_listings();
    }
    info!("Admin reconciliation repaired {repaired} counters");
    Ok(Json(ReconcileResponse { repaired }))
}

struct InfluencerFields {
    name: String,
    handle: String,
    bio: Option<String>,
    photo_url: Option<String>,
    video_url: Option<String>,
    hashtags: Vec<String>,
    category: &'static str,
}

impl InfluencerFields {
    fn validate(request: &InfluencerUpsertRequest) -> Result<Self, HttpError> {
        let invalid = |err: anyhow::Error| HttpError::bad_request(err.to_string());
        Ok(Self {
            name: canonicalize_name(&request.name).map_err(invalid)?,
            handle: canonicalize_handle(&request.handle).map_err(invalid)?,
            bio: canonicalize_bio(request.bio.as_deref()).map_err(invalid)?,
            photo_url: canonicalize_media_url("photoUrl", request.photo_url.as_deref())
                .map_err(invalid)?,
            video_url: canonicalize_media_url("videoUrl", request.video_url.as_deref())
                .map_err(invalid)?,
            hashtags: canonicalize_hashtags(&request.hashtags).map_err(invalid)?,
            category: normalize_category(&request.category).map_err(invalid)?,
        })
    }
}

fn write_error(err: DbErr) -> HttpError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => HttpError::new(
            StatusCode::CONFLICT,
            "An influencer with this handle already exists".to_string(),
        ),
        _ => HttpError::internal(err),
    }
}

fn session_cookie(
    token: String,
    ttl_hours: i64,
    environment: DeployEnvironment,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::hours(ttl_hours));
    cookie.set_secure(environment == DeployEnvironment::Production);
    cookie
}

/// Compares digests so timing does not depend on where the inputs differ.
fn constant_time_eq(presented: &str, expected: &str) -> bool {
    let left = Sha256::digest(presented.as_bytes());
    let right = Sha256::digest(expected.as_bytes());
    left.iter()
        .zip(right.iter())
        .fold(0_u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
