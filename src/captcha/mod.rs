//! reCAPTCHA `siteverify` client.
//!
//! Transport failures surface as [`CaptchaError`]; the vote pipeline treats
//! those as a pass so an outage at the verifier never blocks real voters.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::CaptchaConfig;

#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
    #[error("captcha verifier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("captcha verifier returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptchaVerdict {
    pub success: bool,
    /// Present for score-based (v3) keys only.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, rename = "error-codes")]
    pub error_codes: Vec<String>,
}

impl CaptchaVerdict {
    pub fn passes(&self, min_score: f64) -> bool {
        assert!(
            (0.0..=1.0).contains(&min_score),
            "Minimum score must be within 0.0..=1.0"
        );
        self.success && self.score.is_none_or(|score| score >= min_score)
    }
}

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<CaptchaVerdict, CaptchaError>;

    fn min_score(&self) -> f64;
}

#[derive(Clone)]
pub struct RecaptchaClient {
    http: reqwest::Client,
    secret: String,
    verify_url: String,
    min_score: f64,
}

impl RecaptchaClient {
    /// Returns `None` when no secret is configured, which disables the check.
    pub fn from_config(config: &CaptchaConfig) -> anyhow::Result<Option<Self>> {
        let Some(secret) = config.secret() else {
            return Ok(None);
        };
        Ok(Some(Self::new(
            secret,
            &config.verify_url,
            config.min_score,
            config.timeout(),
        )?))
    }

    pub fn new(
        secret: &str,
        verify_url: &str,
        min_score: f64,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        assert!(!secret.is_empty(), "Captcha secret must be provided");
        assert!(!verify_url.is_empty(), "Captcha verify URL must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| anyhow::anyhow!("Failed to build captcha HTTP client: {err}"))?;

        Ok(Self {
            http,
            secret: secret.to_string(),
            verify_url: verify_url.to_string(),
            min_score,
        })
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaClient {
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<CaptchaVerdict, CaptchaError> {
        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = self.http.post(&self.verify_url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(CaptchaError::Status(response.status().as_u16()));
        }

        let verdict: CaptchaVerdict = response.json().await?;
        Ok(verdict)
    }

    fn min_score(&self) -> f64 {
        self.min_score
    }
}
