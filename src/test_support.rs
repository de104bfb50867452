use std::sync::Arc;

use chrono::{TimeZone, Utc};
use migration::MigratorTrait;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, EntityTrait};

use crate::captcha::CaptchaVerifier;
use crate::config::{
    AdminConfig, ApiConfig, CacheConfig, CampaignConfig, CaptchaConfig, DatabaseConfig,
    DeployEnvironment, RateLimitingConfig, ReconcilerConfig, ServerConfig, VotingConfig,
};
use crate::entities::influencer;
use crate::state::{ApiCache, AppState};
use crate::voting::VoteIntake;
use crate::voting::hashing::VoterHasher;
use crate::voting::ledger::{BallotStore, VoteLedger};
use crate::voting::rate_limit::RateLimiter;

pub const TEST_SALT: &str = "test-salt-0123456789abcdef";
pub const TEST_SESSION_TOKEN: &str = "test-session-token-0123456789abcdefghij";
pub const TEST_ADMIN_USER: &str = "curator";
pub const TEST_ADMIN_PASSWORD: &str = "hunter2";

pub fn test_config() -> ApiConfig {
    ApiConfig {
        server: ServerConfig {
            host: None,
            port: 8080,
            environment: DeployEnvironment::Development,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: None,
        },
        voting: VotingConfig {
            hash_salt: TEST_SALT.to_string(),
        },
        captcha: CaptchaConfig::default(),
        admin: AdminConfig {
            username: TEST_ADMIN_USER.to_string(),
            password: TEST_ADMIN_PASSWORD.to_string(),
            session_token: TEST_SESSION_TOKEN.to_string(),
            session_ttl_hours: 12,
        },
        campaign: CampaignConfig {
            ends_at: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        },
        rate_limiting: RateLimitingConfig::default(),
        cache: CacheConfig::default(),
        reconciler: ReconcilerConfig::default(),
    }
}

/// Fresh in-memory SQLite with migrations applied. A single connection keeps
/// every query on the same in-memory database.
pub async fn memory_database() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let database = Database::connect(options)
        .await
        .expect("in-memory sqlite connects");
    migration::Migrator::up(&database, None)
        .await
        .expect("migrations apply");
    database
}

pub async fn seed_influencer(
    database: &DatabaseConnection,
    handle: &str,
    category: &str,
) -> influencer::Model {
    let now = Utc::now().fixed_offset();
    let model = influencer::ActiveModel {
        id: NotSet,
        name: Set(format!("Creator {handle}")),
        handle: Set(handle.to_string()),
        bio: Set(None),
        photo_url: Set(None),
        video_url: Set(None),
        hashtags: Set(serde_json::json!(["#scent"])),
        category: Set(category.to_string()),
        is_active: Set(true),
        display_order: Set(0),
        vote_count: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };
    influencer::Entity::insert(model)
        .exec_with_returning(database)
        .await
        .expect("influencer seeded")
}

pub fn test_cache() -> Arc<ApiCache> {
    Arc::new(ApiCache::new(&CacheConfig::default()))
}

pub fn test_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(&RateLimitingConfig::default()))
}

pub fn test_intake(
    store: Arc<dyn BallotStore>,
    captcha: Option<Arc<dyn CaptchaVerifier>>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ApiCache>,
) -> VoteIntake {
    VoteIntake::new(
        store,
        limiter,
        VoterHasher::new(TEST_SALT),
        captcha,
        cache,
        DeployEnvironment::Development,
    )
}

/// Full application state over the given database with CAPTCHA disabled.
pub fn test_state(database: DatabaseConnection) -> AppState {
    let config = test_config();
    let cache = test_cache();
    let limiter = test_limiter();
    let intake = Arc::new(test_intake(
        Arc::new(VoteLedger::new(database.clone())),
        None,
        Arc::clone(&limiter),
        Arc::clone(&cache),
    ));
    AppState::new(
        database,
        intake,
        cache,
        limiter,
        config.admin,
        config.campaign,
        config.server.environment,
    )
}
