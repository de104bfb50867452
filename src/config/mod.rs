use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono::{DateTime, Utc};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

/// Shortest salt accepted for voter hashing.
pub const MIN_HASH_SALT_LEN: usize = 16;
/// Shortest admin session token accepted.
pub const MIN_SESSION_TOKEN_LEN: usize = 32;
/// Longest admin session lifetime accepted (30 days).
pub const MAX_SESSION_TTL_HOURS: i64 = 720;
/// Largest database pool accepted.
pub const MAX_DB_CONNECTIONS: u32 = 128;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub voting: VotingConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    pub admin: AdminConfig,
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl ApiConfig {
    /// Loads `config/api.toml` (or `SCENT_VOTE_CONFIG`), an optional
    /// `config/api.{SCENT_VOTE_ENV}.toml` overlay, then `SCENT_VOTE__*`
    /// environment variables, e.g. `SCENT_VOTE__VOTING__HASH_SALT`.
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("SCENT_VOTE_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(false));

        if let Ok(env_override) = std::env::var("SCENT_VOTE_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SCENT_VOTE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.database.url.is_empty(), "database.url must be set");
        ensure!(self.server.port > 0, "server.port must be greater than zero");
        ensure!(
            self.voting.hash_salt.trim().len() >= MIN_HASH_SALT_LEN,
            "voting.hash_salt is required and must be at least {MIN_HASH_SALT_LEN} bytes"
        );
        ensure!(
            !self.admin.username.trim().is_empty() && !self.admin.password.is_empty(),
            "admin.username and admin.password must be set"
        );
        ensure!(
            self.admin.session_token.len() >= MIN_SESSION_TOKEN_LEN,
            "admin.session_token must be at least {MIN_SESSION_TOKEN_LEN} bytes"
        );
        ensure!(
            (1..=MAX_SESSION_TTL_HOURS).contains(&self.admin.session_ttl_hours),
            "admin.session_ttl_hours must be within 1..={MAX_SESSION_TTL_HOURS}"
        );
        ensure!(
            self.database.max_connections >= self.database.min_connections.unwrap_or(1),
            "database.max_connections must be >= min_connections"
        );
        ensure!(
            self.database.max_connections <= MAX_DB_CONNECTIONS,
            "database.max_connections must be at most {MAX_DB_CONNECTIONS}"
        );
        self.rate_limiting.vote.ensure_bounds("rate_limiting.vote")?;
        self.rate_limiting
            .admin_login
            .ensure_bounds("rate_limiting.admin_login")?;
        self.captcha.ensure_bounds()?;
        self.cache.ensure_bounds()?;
        self.reconciler.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnvironment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
    #[serde(default)]
    pub environment: DeployEnvironment,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == DeployEnvironment::Production
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VotingConfig {
    pub hash_salt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// reCAPTCHA secret. Verification is skipped entirely when unset.
    pub secret: Option<String>,
    #[serde(default = "CaptchaConfig::default_verify_url")]
    pub verify_url: String,
    #[serde(default = "CaptchaConfig::default_min_score")]
    pub min_score: f64,
    #[serde(default = "CaptchaConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl CaptchaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|secret| !secret.trim().is_empty())
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.min_score),
            "captcha.min_score must be within 0.0..=1.0"
        );
        ensure!(
            (100..=30_000).contains(&self.timeout_ms),
            "captcha.timeout_ms must be within 100..=30000"
        );
        Ok(())
    }

    fn default_verify_url() -> String {
        "https://www.google.com/recaptcha/api/siteverify".to_string()
    }

    const fn default_min_score() -> f64 {
        0.5
    }

    const fn default_timeout_ms() -> u64 {
        3_000
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            secret: None,
            verify_url: Self::default_verify_url(),
            min_score: Self::default_min_score(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    pub session_token: String,
    #[serde(default = "AdminConfig::default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

impl AdminConfig {
    const fn default_session_ttl_hours() -> i64 {
        12
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("session_ttl_hours", &self.session_ttl_hours)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    pub ends_at: DateTime<Utc>,
}

impl CampaignConfig {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        now < self.ends_at
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitRule {
    pub max_attempts: u32,
    pub window_seconds: u64,
}

impl RateLimitRule {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    fn ensure_bounds(&self, label: &str) -> Result<()> {
        ensure!(self.max_attempts > 0, "{label}.max_attempts must be positive");
        ensure!(
            (1..=86_400).contains(&self.window_seconds),
            "{label}.window_seconds must be within 1..=86400"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitingConfig {
    #[serde(default = "RateLimitingConfig::default_vote")]
    pub vote: RateLimitRule,
    #[serde(default = "RateLimitingConfig::default_admin_login")]
    pub admin_login: RateLimitRule,
}

impl RateLimitingConfig {
    const fn default_vote() -> RateLimitRule {
        RateLimitRule {
            max_attempts: 3,
            window_seconds: 600,
        }
    }

    const fn default_admin_login() -> RateLimitRule {
        RateLimitRule {
            max_attempts: 5,
            window_seconds: 900,
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            vote: Self::default_vote(),
            admin_login: Self::default_admin_login(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub listings_max_capacity: u64,
    pub listings_ttl_seconds: u64,
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            self.listings_max_capacity >= 8,
            "cache.listings_max_capacity must be at least 8"
        );
        ensure!(
            (1..=3_600).contains(&self.listings_ttl_seconds),
            "cache.listings_ttl_seconds must be within 1..=3600"
        );
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listings_max_capacity: 64,
            listings_ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl ReconcilerConfig {
    pub fn interval(&self) -> Duration {
        assert!(
            self.interval_seconds >= 10,
            "Reconciler interval must be >= 10 seconds"
        );
        Duration::from_secs(self.interval_seconds)
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            (10..=86_400).contains(&self.interval_seconds),
            "reconciler.interval_seconds must be within 10..=86400"
        );
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 300,
        }
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
