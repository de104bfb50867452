use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use sea_orm::DatabaseConnection;

use crate::config::{AdminConfig, CacheConfig, CampaignConfig, DeployEnvironment};
use crate::models::influencer::InfluencerView;
use crate::voting::VoteIntake;
use crate::voting::ledger::VoteLedger;
use crate::voting::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub ledger: VoteLedger,
    pub intake: Arc<VoteIntake>,
    pub cache: Arc<ApiCache>,
    pub limiter: Arc<RateLimiter>,
    pub admin: Arc<AdminConfig>,
    pub campaign: CampaignConfig,
    pub environment: DeployEnvironment,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        database: DatabaseConnection,
        intake: Arc<VoteIntake>,
        cache: Arc<ApiCache>,
        limiter: Arc<RateLimiter>,
        admin: AdminConfig,
        campaign: CampaignConfig,
        environment: DeployEnvironment,
    ) -> Self {
        assert!(
            cache.listing_capacity >= 8,
            "Listing cache capacity must be configured"
        );
        Self {
            ledger: VoteLedger::new(database.clone()),
            database,
            intake,
            cache,
            limiter,
            admin: Arc::new(admin),
            campaign,
            environment,
            start_time: Instant::now(),
        }
    }
}

/// Rendered public listings keyed by category filter (`"all"` for none).
/// Entries expire after the configured TTL; votes and admin edits drop
/// them eagerly.
pub struct ApiCache {
    pub listings: Cache<String, Arc<Vec<InfluencerView>>>,
    pub listing_capacity: u64,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.listings_max_capacity >= 8,
            "Listing cache capacity threshold"
        );

        let listings = Cache::builder()
            .max_capacity(config.listings_max_capacity)
            .time_to_live(Duration::from_secs(config.listings_ttl_seconds))
            .time_to_idle(Duration::from_secs(config.listings_ttl_seconds / 2 + 1))
            .build();

        Self {
            listings,
            listing_capacity: config.listings_max_capacity,
        }
    }

    pub fn invalidate_listings(&self) {
        self.listings.invalidate_all();
    }
}
