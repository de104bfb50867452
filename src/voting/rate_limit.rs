//! Process-local fixed-window rate limiting keyed by `"{action}:{client}"`.
//!
//! Entries live only in this process: a restart clears every window and
//! separate instances keep separate tables.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;

use crate::config::{RateLimitRule, RateLimitingConfig};

/// Fraction of `check` calls that also sweep expired entries.
const SWEEP_PROBABILITY: f64 = 0.01;
const MAX_CLIENT_KEY_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Vote,
    AdminLogin,
}

impl RateLimitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vote => "vote",
            Self::AdminLogin => "admin_login",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    vote: RateLimitRule,
    admin_login: RateLimitRule,
}

impl RateLimiter {
    pub fn new(config: &RateLimitingConfig) -> Self {
        assert!(config.vote.max_attempts > 0, "Vote limit must be positive");
        assert!(
            config.admin_login.max_attempts > 0,
            "Login limit must be positive"
        );
        Self {
            entries: Mutex::new(HashMap::new()),
            vote: config.vote,
            admin_login: config.admin_login,
        }
    }

    pub fn check(&self, client: &str, action: RateLimitAction) -> RateLimitDecision {
        let now = Instant::now();
        if rand::thread_rng().gen_bool(SWEEP_PROBABILITY) {
            self.sweep_expired(now);
        }
        self.check_at(client, action, now)
    }

    pub(crate) fn check_at(
        &self,
        client: &str,
        action: RateLimitAction,
        now: Instant,
    ) -> RateLimitDecision {
        let rule = self.rule(action);
        let key = entry_key(client, action);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get_mut(&key).filter(|entry| entry.reset_at > now) {
            entry.count = entry.count.saturating_add(1);
            return if entry.count <= rule.max_attempts {
                RateLimitDecision::Allowed {
                    remaining: rule.max_attempts - entry.count,
                }
            } else {
                RateLimitDecision::Limited {
                    retry_after: entry.reset_at.saturating_duration_since(now),
                }
            };
        }

        entries.insert(
            key,
            RateLimitEntry {
                count: 1,
                reset_at: now + rule.window(),
            },
        );
        RateLimitDecision::Allowed {
            remaining: rule.max_attempts - 1,
        }
    }

    /// Drops every window that has already elapsed. Returns how many went.
    pub(crate) fn sweep_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Rate limiter swept {removed} expired windows");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn rule(&self, action: RateLimitAction) -> RateLimitRule {
        match action {
            RateLimitAction::Vote => self.vote,
            RateLimitAction::AdminLogin => self.admin_login,
        }
    }
}

fn entry_key(client: &str, action: RateLimitAction) -> String {
    let client = if client.len() > MAX_CLIENT_KEY_LEN {
        &client[..floor_char_boundary(client, MAX_CLIENT_KEY_LEN)]
    } else {
        client
    };
    format!("{}:{}", action.as_str(), client)
}

fn floor_char_boundary(value: &str, index: usize) -> usize {
    (0..=index)
        .rev()
        .find(|&candidate| value.is_char_boundary(candidate))
        .unwrap_or(0)
}

/// Whole seconds to report to clients, never zero while limited.
pub fn retry_after_seconds(retry_after: Duration) -> u64 {
    let mut seconds = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        seconds += 1;
    }
    seconds.max(1)
}
