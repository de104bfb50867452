use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::state::AppState;

mod admin;
mod influencers;
mod votes;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let votes_router = votes::router().with_state(state.clone());
    let influencers_router = influencers::router().with_state(state.clone());
    let admin_router = admin::router(state.clone()).with_state(state.clone());
    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/api/campaign", get(influencers::campaign_status))
        .nest("/api/votes", votes_router)
        .nest("/api/influencers", influencers_router)
        .nest("/api/admin", admin_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let response = HealthResponse {
        status: "live",
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .database
        .ping()
        .await
        .map_err(|err| {
            error!("Readiness database ping failed: {err}");
            HttpError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "database unavailable".to_string(),
            )
        })?;

    let response = ReadyResponse {
        status: "ready",
        cached_listings: state.cache.listings.entry_count(),
        rate_limit_windows: state.limiter.tracked_keys(),
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    cached_listings: u64,
    rate_limit_windows: usize,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self { status, message }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into())
    }

    /// Logs the detail; the client only sees a generic message.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        error!("Internal error: {err}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error {}: {}", self.status.as_u16(), self.message);
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}
