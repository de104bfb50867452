//! Vote intake pipeline.
//!
//! Checks run in a fixed order and stop at the first failure: honeypot,
//! payload validation, rate limit, disposable email, CAPTCHA, hashing,
//! candidate lookup, duplicate pre-check, insert, counter increment,
//! read-back and listing invalidation. The unique index on
//! `(influencer_id, email_hash)` is the real duplicate guard; the pre-check
//! only gives a faster answer.

pub mod client_ip;
pub mod email;
pub mod hashing;
pub mod ledger;
pub mod rate_limit;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::captcha::CaptchaVerifier;
use crate::config::DeployEnvironment;
use crate::state::ApiCache;

use self::client_ip::ClientHints;
use self::email::{MAX_EMAIL_LEN, is_disposable_email, is_valid_email};
use self::hashing::{VoterHasher, mask_email};
use self::ledger::{BallotStore, LedgerError, NewBallot};
use self::rate_limit::{RateLimitAction, RateLimitDecision, RateLimiter, retry_after_seconds};

pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_NAME_CHARS: usize = 100;
const MAX_CAPTCHA_TOKEN_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteRejection {
    InvalidInput,
    RateLimited { retry_after_secs: u64 },
    InvalidEmail,
    CaptchaFailed,
    AlreadyVoted,
    ServerError,
}

impl VoteRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidEmail => "invalid_email",
            Self::CaptchaFailed => "captcha_failed",
            Self::AlreadyVoted => "already_voted",
            Self::ServerError => "server_error",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidInput => "Please check your details and try again.",
            Self::RateLimited { .. } => "Too many attempts. Please try again later.",
            Self::InvalidEmail => "Please use a permanent email address.",
            Self::CaptchaFailed => "Verification failed. Please try again.",
            Self::AlreadyVoted => "You have already voted for this creator.",
            Self::ServerError => "Something went wrong. Please try again later.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// `new_vote_count` is `None` when the read-back failed, and also for
    /// honeypot submissions, which look accepted but write nothing.
    Accepted { new_vote_count: Option<i64> },
    Rejected(VoteRejection),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSubmission {
    name: String,
    email: String,
    influencer_id: i64,
    #[serde(default)]
    recaptcha_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedVote {
    pub name: String,
    pub email: String,
    pub influencer_id: i64,
    pub captcha_token: Option<String>,
}

impl ValidatedVote {
    /// Schema checks. The error string is for server logs only.
    pub fn parse(payload: Value) -> Result<Self, String> {
        let raw: RawSubmission =
            serde_json::from_value(payload).map_err(|err| format!("payload shape: {err}"))?;

        let name = raw.name.trim().to_string();
        let name_chars = name.chars().count();
        if !(MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&name_chars) {
            return Err(format!("name length {name_chars} out of range"));
        }
        if name.chars().any(char::is_control) {
            return Err("name contains control characters".to_string());
        }

        let email = raw.email.trim().to_string();
        if email.len() > MAX_EMAIL_LEN || !is_valid_email(&email) {
            return Err("email syntax".to_string());
        }

        if raw.influencer_id <= 0 {
            return Err(format!("influencer id {} not positive", raw.influencer_id));
        }

        let captcha_token = raw
            .recaptcha_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        if captcha_token
            .as_ref()
            .is_some_and(|token| token.len() > MAX_CAPTCHA_TOKEN_LEN)
        {
            return Err("captcha token too long".to_string());
        }

        Ok(Self {
            name,
            email,
            influencer_id: raw.influencer_id,
            captcha_token,
        })
    }
}

/// Any non-empty value in the hidden `honeypot` field marks an automated
/// submitter.
pub fn honeypot_tripped(payload: &Value) -> bool {
    match payload.get("honeypot") {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Bool(flag)) => *flag,
        Some(_) => true,
    }
}

pub struct VoteIntake {
    store: Arc<dyn BallotStore>,
    limiter: Arc<RateLimiter>,
    hasher: VoterHasher,
    captcha: Option<Arc<dyn CaptchaVerifier>>,
    cache: Arc<ApiCache>,
    environment: DeployEnvironment,
}

impl VoteIntake {
    pub fn new(
        store: Arc<dyn BallotStore>,
        limiter: Arc<RateLimiter>,
        hasher: VoterHasher,
        captcha: Option<Arc<dyn CaptchaVerifier>>,
        cache: Arc<ApiCache>,
        environment: DeployEnvironment,
    ) -> Self {
        Self {
            store,
            limiter,
            hasher,
            captcha,
            cache,
            environment,
        }
    }

    pub async fn submit(&self, body: &[u8], hints: &ClientHints) -> VoteOutcome {
        let payload: Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Vote rejected: malformed JSON body: {err}");
                return VoteOutcome::Rejected(VoteRejection::InvalidInput);
            }
        };

        if honeypot_tripped(&payload) {
            info!("Honeypot field filled; discarding submission");
            return VoteOutcome::Accepted {
                new_vote_count: None,
            };
        }

        let vote = match ValidatedVote::parse(payload) {
            Ok(vote) => vote,
            Err(reason) => {
                warn!("Vote rejected: invalid input ({reason})");
                return VoteOutcome::Rejected(VoteRejection::InvalidInput);
            }
        };

        let client = hints.resolve(self.environment);

        if let RateLimitDecision::Limited { retry_after } =
            self.limiter.check(&client, RateLimitAction::Vote)
        {
            let retry_after_secs = retry_after_seconds(retry_after);
            warn!("Vote rate limited for client {client}; retry in {retry_after_secs}s");
            return VoteOutcome::Rejected(VoteRejection::RateLimited { retry_after_secs });
        }

        if is_disposable_email(&vote.email) {
            warn!(
                "Vote rejected: disposable email {}",
                mask_email(&vote.email)
            );
            return VoteOutcome::Rejected(VoteRejection::InvalidEmail);
        }

        if let Some(rejection) = self.check_captcha(&vote, &client).await {
            return VoteOutcome::Rejected(rejection);
        }

        let email_hash = self.hasher.hash_email(&vote.email);
        let ip_hash = self.hasher.hash_client(&client);

        match self.record(&vote, email_hash, ip_hash).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    "Vote for influencer {} by {} failed: {err}",
                    vote.influencer_id,
                    mask_email(&vote.email)
                );
                VoteOutcome::Rejected(VoteRejection::ServerError)
            }
        }
    }

    async fn check_captcha(&self, vote: &ValidatedVote, client: &str) -> Option<VoteRejection> {
        let (Some(verifier), Some(token)) = (self.captcha.as_ref(), vote.captcha_token.as_deref())
        else {
            return None;
        };

        match verifier.verify(token, Some(client)).await {
            Ok(verdict) if verdict.passes(verifier.min_score()) => None,
            Ok(verdict) => {
                warn!(
                    "Vote rejected: captcha failed (success={}, score={:?}, action={:?}, errors={:?})",
                    verdict.success, verdict.score, verdict.action, verdict.error_codes
                );
                Some(VoteRejection::CaptchaFailed)
            }
            Err(err) => {
                warn!("Captcha verifier unavailable, allowing vote: {err}");
                None
            }
        }
    }

    async fn record(
        &self,
        vote: &ValidatedVote,
        email_hash: String,
        ip_hash: String,
    ) -> Result<VoteOutcome, LedgerError> {
        let influencer_id = vote.influencer_id;

        let candidate = match self.store.find_candidate(influencer_id).await? {
            Some(candidate) if candidate.is_active => candidate,
            Some(_) => {
                warn!("Vote rejected: influencer {influencer_id} is inactive");
                return Ok(VoteOutcome::Rejected(VoteRejection::InvalidInput));
            }
            None => {
                warn!("Vote rejected: influencer {influencer_id} does not exist");
                return Ok(VoteOutcome::Rejected(VoteRejection::InvalidInput));
            }
        };

        if self.store.has_voted(influencer_id, &email_hash).await? {
            info!(
                "Duplicate vote for influencer {influencer_id} by {}",
                mask_email(&vote.email)
            );
            return Ok(VoteOutcome::Rejected(VoteRejection::AlreadyVoted));
        }

        let ballot = NewBallot {
            influencer_id,
            voter_name: vote.name.clone(),
            email_hash,
            ip_hash,
            category: Some(candidate.category),
        };

        let stored = match self.store.record_ballot(ballot).await {
            Ok(stored) => stored,
            Err(LedgerError::Duplicate) => {
                info!(
                    "Concurrent duplicate vote for influencer {influencer_id} caught by unique index"
                );
                return Ok(VoteOutcome::Rejected(VoteRejection::AlreadyVoted));
            }
            Err(err) => return Err(err),
        };

        self.bump_counter(influencer_id).await;

        let new_vote_count = match self.store.vote_count(influencer_id).await {
            Ok(count) => count,
            Err(err) => {
                warn!("Could not read back vote_count for influencer {influencer_id}: {err}");
                None
            }
        };

        self.cache.invalidate_listings();

        info!(
            "Vote {} recorded for influencer {influencer_id} by {}",
            stored.id,
            mask_email(&vote.email)
        );

        Ok(VoteOutcome::Accepted { new_vote_count })
    }

    /// The ballot is already durable here, so a failed increment is logged
    /// and retried once, never reported to the voter.
    async fn bump_counter(&self, influencer_id: i64) {
        let Err(first) = self.store.increment_vote_count(influencer_id).await else {
            return;
        };
        warn!("vote_count increment for influencer {influencer_id} failed, retrying: {first}");

        if let Err(second) = self.store.increment_vote_count(influencer_id).await {
            error!(
                "vote_count for influencer {influencer_id} left behind the vote table after retry: {second}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, Set};
    use serde_json::json;

    use super::*;
    use crate::captcha::{CaptchaError, CaptchaVerdict};
    use crate::entities::{influencer, vote};
    use crate::models::influencer::InfluencerView;
    use crate::test_support::{
        memory_database, seed_influencer, test_cache, test_intake, test_limiter,
    };
    use crate::voting::ledger::VoteLedger;

    fn ballot_body(name: &str, email: &str, influencer_id: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "name": name,
            "email": email,
            "influencerId": influencer_id,
        }))
        .unwrap()
    }

    fn hints_for(ip: &str) -> ClientHints {
        ClientHints {
            forwarded_for: Some(ip.to_string()),
            real_ip: None,
            peer: None,
        }
    }

    fn ledger_intake(database: &DatabaseConnection) -> (VoteIntake, Arc<ApiCache>) {
        let cache = test_cache();
        let intake = test_intake(
            Arc::new(VoteLedger::new(database.clone())),
            None,
            test_limiter(),
            Arc::clone(&cache),
        );
        (intake, cache)
    }

    async fn stored_votes(database: &DatabaseConnection) -> Vec<vote::Model> {
        vote::Entity::find().all(database).await.unwrap()
    }

    async fn stored_count(database: &DatabaseConnection, id: i64) -> i64 {
        influencer::Entity::find_by_id(id)
            .one(database)
            .await
            .unwrap()
            .expect("influencer exists")
            .vote_count
    }

    #[tokio::test]
    async fn first_vote_is_counted_once() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let (intake, _) = ledger_intake(&database);

        let outcome = intake
            .submit(
                &ballot_body("Ada Lovelace", "ada@example.com", rose.id),
                &hints_for("203.0.113.7"),
            )
            .await;

        assert_eq!(
            outcome,
            VoteOutcome::Accepted {
                new_vote_count: Some(1)
            }
        );
        let votes = stored_votes(&database).await;
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].voter_name, "Ada Lovelace");
        assert_eq!(votes[0].category.as_deref(), Some("floral"));
        assert_eq!(votes[0].email_hash.len(), 64);
        assert!(!votes[0].email_hash.contains("ada"));
        assert_eq!(stored_count(&database, rose.id).await, 1);
    }

    #[tokio::test]
    async fn second_vote_from_same_email_is_already_voted() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let cedar = seed_influencer(&database, "cedar", "woody").await;
        let (intake, _) = ledger_intake(&database);
        let hints = hints_for("203.0.113.8");

        intake
            .submit(&ballot_body("Ada", "ada@example.com", rose.id), &hints)
            .await;
        let again = intake
            .submit(&ballot_body("Ada", "  ADA@Example.com ", rose.id), &hints)
            .await;
        assert_eq!(again, VoteOutcome::Rejected(VoteRejection::AlreadyVoted));

        // Same voter may still back a different creator.
        let other = intake
            .submit(&ballot_body("Ada", "ada@example.com", cedar.id), &hints)
            .await;
        assert!(matches!(other, VoteOutcome::Accepted { .. }));

        assert_eq!(stored_votes(&database).await.len(), 2);
        assert_eq!(stored_count(&database, rose.id).await, 1);
        assert_eq!(stored_count(&database, cedar.id).await, 1);
    }

    #[tokio::test]
    async fn honeypot_looks_accepted_but_writes_nothing() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let (intake, _) = ledger_intake(&database);

        let body = serde_json::to_vec(&json!({
            "name": "Bot",
            "email": "bot@example.com",
            "influencerId": rose.id,
            "honeypot": "http://spam.example",
        }))
        .unwrap();
        let outcome = intake.submit(&body, &hints_for("198.51.100.1")).await;

        assert_eq!(
            outcome,
            VoteOutcome::Accepted {
                new_vote_count: None
            }
        );
        assert!(stored_votes(&database).await.is_empty());
        assert_eq!(stored_count(&database, rose.id).await, 0);
    }

    #[test]
    fn honeypot_detection() {
        assert!(!honeypot_tripped(&json!({ "name": "Ada" })));
        assert!(!honeypot_tripped(&json!({ "honeypot": "" })));
        assert!(!honeypot_tripped(&json!({ "honeypot": null })));
        assert!(honeypot_tripped(&json!({ "honeypot": "x" })));
        assert!(honeypot_tripped(&json!({ "honeypot": 1 })));
    }

    #[tokio::test]
    async fn fourth_attempt_in_window_is_rate_limited() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let (intake, _) = ledger_intake(&database);
        let hints = hints_for("192.0.2.44");

        for index in 0..3 {
            let email = format!("voter{index}@example.com");
            let outcome = intake
                .submit(&ballot_body("Voter", &email, rose.id), &hints)
                .await;
            assert!(matches!(outcome, VoteOutcome::Accepted { .. }));
        }

        let outcome = intake
            .submit(&ballot_body("Voter", "voter9@example.com", rose.id), &hints)
            .await;
        match outcome {
            VoteOutcome::Rejected(VoteRejection::RateLimited { retry_after_secs }) => {
                assert!(retry_after_secs > 0);
                assert!(retry_after_secs <= 600);
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        // Another client is unaffected.
        let outcome = intake
            .submit(
                &ballot_body("Voter", "voter9@example.com", rose.id),
                &hints_for("192.0.2.45"),
            )
            .await;
        assert!(matches!(outcome, VoteOutcome::Accepted { .. }));
        assert_eq!(stored_count(&database, rose.id).await, 4);
    }

    #[tokio::test]
    async fn rejects_invalid_payloads() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let (intake, _) = ledger_intake(&database);
        let hints = hints_for("192.0.2.50");
        let invalid = VoteOutcome::Rejected(VoteRejection::InvalidInput);

        assert_eq!(intake.submit(b"{not json", &hints).await, invalid);
        assert_eq!(intake.submit(b"[]", &hints).await, invalid);
        assert_eq!(
            intake
                .submit(&ballot_body("A", "ada@example.com", rose.id), &hints)
                .await,
            invalid
        );
        assert_eq!(
            intake
                .submit(&ballot_body("Ada", "not-an-email", rose.id), &hints)
                .await,
            invalid
        );
        assert_eq!(
            intake
                .submit(&ballot_body("Ada", "ada@example.com", 0), &hints)
                .await,
            invalid
        );
        assert!(stored_votes(&database).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_or_inactive_candidate_is_invalid_input() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let mut inactive = rose.clone().into_active_model();
        inactive.is_active = Set(false);
        inactive.update(&database).await.unwrap();
        let (intake, _) = ledger_intake(&database);
        let hints = hints_for("192.0.2.60");

        let outcome = intake
            .submit(&ballot_body("Ada", "ada@example.com", rose.id), &hints)
            .await;
        assert_eq!(outcome, VoteOutcome::Rejected(VoteRejection::InvalidInput));

        let outcome = intake
            .submit(&ballot_body("Ada", "ada@example.com", 4_242), &hints)
            .await;
        assert_eq!(outcome, VoteOutcome::Rejected(VoteRejection::InvalidInput));
        assert!(stored_votes(&database).await.is_empty());
    }

    #[tokio::test]
    async fn disposable_email_is_rejected() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let (intake, _) = ledger_intake(&database);

        let outcome = intake
            .submit(
                &ballot_body("Ada", "ada@mailinator.com", rose.id),
                &hints_for("192.0.2.70"),
            )
            .await;
        assert_eq!(outcome, VoteOutcome::Rejected(VoteRejection::InvalidEmail));
        assert!(stored_votes(&database).await.is_empty());
    }

    #[tokio::test]
    async fn accepted_vote_drops_cached_listings() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let (intake, cache) = ledger_intake(&database);

        cache
            .listings
            .insert("all".to_string(), Arc::new(vec![InfluencerView::from(rose.clone())]))
            .await;
        assert!(cache.listings.get("all").await.is_some());

        intake
            .submit(
                &ballot_body("Ada", "ada@example.com", rose.id),
                &hints_for("192.0.2.80"),
            )
            .await;
        assert!(cache.listings.get("all").await.is_none());
    }

    struct StubCaptcha {
        verdict: Option<CaptchaVerdict>,
        calls: AtomicUsize,
    }

    impl StubCaptcha {
        fn scoring(score: f64) -> Self {
            Self {
                verdict: Some(CaptchaVerdict {
                    success: true,
                    score: Some(score),
                    action: Some("vote".to_string()),
                    error_codes: Vec::new(),
                }),
                calls: AtomicUsize::new(0),
            }
        }

        fn unreachable() -> Self {
            Self {
                verdict: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CaptchaVerifier for StubCaptcha {
        async fn verify(
            &self,
            _token: &str,
            _remote_ip: Option<&str>,
        ) -> Result<CaptchaVerdict, CaptchaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone().ok_or(CaptchaError::Status(503))
        }

        fn min_score(&self) -> f64 {
            0.5
        }
    }

    fn captcha_body(influencer_id: i64, email: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "name": "Ada",
            "email": email,
            "influencerId": influencer_id,
            "recaptchaToken": "token-abc",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn low_captcha_score_is_rejected() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let stub = Arc::new(StubCaptcha::scoring(0.1));
        let intake = test_intake(
            Arc::new(VoteLedger::new(database.clone())),
            Some(stub.clone()),
            test_limiter(),
            test_cache(),
        );

        let outcome = intake
            .submit(&captcha_body(rose.id, "ada@example.com"), &hints_for("192.0.2.90"))
            .await;
        assert_eq!(outcome, VoteOutcome::Rejected(VoteRejection::CaptchaFailed));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert!(stored_votes(&database).await.is_empty());

        // Without a token the verifier is not consulted.
        let outcome = intake
            .submit(
                &ballot_body("Ada", "ada@example.com", rose.id),
                &hints_for("192.0.2.91"),
            )
            .await;
        assert!(matches!(outcome, VoteOutcome::Accepted { .. }));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn captcha_outage_fails_open() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let stub = Arc::new(StubCaptcha::unreachable());
        let intake = test_intake(
            Arc::new(VoteLedger::new(database.clone())),
            Some(stub.clone()),
            test_limiter(),
            test_cache(),
        );

        let outcome = intake
            .submit(&captcha_body(rose.id, "ada@example.com"), &hints_for("192.0.2.92"))
            .await;
        assert_eq!(
            outcome,
            VoteOutcome::Accepted {
                new_vote_count: Some(1)
            }
        );
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    /// Wraps the real ledger and injects failures into the counter path.
    struct FlakyStore {
        inner: VoteLedger,
        increment_failures: AtomicUsize,
        fail_read_back: bool,
    }

    impl FlakyStore {
        fn new(
            database: &DatabaseConnection,
            increment_failures: usize,
            fail_read_back: bool,
        ) -> Self {
            Self {
                inner: VoteLedger::new(database.clone()),
                increment_failures: AtomicUsize::new(increment_failures),
                fail_read_back,
            }
        }
    }

    #[async_trait]
    impl BallotStore for FlakyStore {
        async fn find_candidate(&self, id: i64) -> Result<Option<influencer::Model>, LedgerError> {
            self.inner.find_candidate(id).await
        }

        async fn has_voted(
            &self,
            influencer_id: i64,
            email_hash: &str,
        ) -> Result<bool, LedgerError> {
            self.inner.has_voted(influencer_id, email_hash).await
        }

        async fn record_ballot(&self, ballot: NewBallot) -> Result<vote::Model, LedgerError> {
            self.inner.record_ballot(ballot).await
        }

        async fn increment_vote_count(&self, influencer_id: i64) -> Result<(), LedgerError> {
            let remaining = self.increment_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.increment_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(LedgerError::Database(DbErr::Custom(
                    "injected increment failure".to_string(),
                )));
            }
            self.inner.increment_vote_count(influencer_id).await
        }

        async fn vote_count(&self, influencer_id: i64) -> Result<Option<i64>, LedgerError> {
            if self.fail_read_back {
                return Err(LedgerError::Database(DbErr::Custom(
                    "injected read failure".to_string(),
                )));
            }
            self.inner.vote_count(influencer_id).await
        }
    }

    #[tokio::test]
    async fn increment_is_retried_once() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let intake = test_intake(
            Arc::new(FlakyStore::new(&database, 1, false)),
            None,
            test_limiter(),
            test_cache(),
        );

        let outcome = intake
            .submit(
                &ballot_body("Ada", "ada@example.com", rose.id),
                &hints_for("192.0.2.100"),
            )
            .await;
        assert_eq!(
            outcome,
            VoteOutcome::Accepted {
                new_vote_count: Some(1)
            }
        );
    }

    #[tokio::test]
    async fn persistent_increment_failure_still_accepts_and_reconcile_repairs() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let intake = test_intake(
            Arc::new(FlakyStore::new(&database, 2, false)),
            None,
            test_limiter(),
            test_cache(),
        );

        let outcome = intake
            .submit(
                &ballot_body("Ada", "ada@example.com", rose.id),
                &hints_for("192.0.2.101"),
            )
            .await;
        assert_eq!(
            outcome,
            VoteOutcome::Accepted {
                new_vote_count: Some(0)
            }
        );
        assert_eq!(stored_votes(&database).await.len(), 1);

        let ledger = VoteLedger::new(database.clone());
        assert_eq!(ledger.reconcile_counts().await.unwrap(), 1);
        assert_eq!(stored_count(&database, rose.id).await, 1);
    }

    #[tokio::test]
    async fn failed_read_back_reports_null_count() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let intake = test_intake(
            Arc::new(FlakyStore::new(&database, 0, true)),
            None,
            test_limiter(),
            test_cache(),
        );

        let outcome = intake
            .submit(
                &ballot_body("Ada", "ada@example.com", rose.id),
                &hints_for("192.0.2.102"),
            )
            .await;
        assert_eq!(
            outcome,
            VoteOutcome::Accepted {
                new_vote_count: None
            }
        );
        assert_eq!(stored_count(&database, rose.id).await, 1);
    }

    /// Ledger whose duplicate pre-check always misses, as when two submissions
    /// for the same voter race past it. Only the unique index is left to refuse.
    struct IndexOnlyStore {
        inner: VoteLedger,
    }

    #[async_trait]
    impl BallotStore for IndexOnlyStore {
        async fn find_candidate(&self, id: i64) -> Result<Option<influencer::Model>, LedgerError> {
            self.inner.find_candidate(id).await
        }

        async fn has_voted(
            &self,
            _influencer_id: i64,
            _email_hash: &str,
        ) -> Result<bool, LedgerError> {
            Ok(false)
        }

        async fn record_ballot(&self, ballot: NewBallot) -> Result<vote::Model, LedgerError> {
            self.inner.record_ballot(ballot).await
        }

        async fn increment_vote_count(&self, influencer_id: i64) -> Result<(), LedgerError> {
            self.inner.increment_vote_count(influencer_id).await
        }

        async fn vote_count(&self, influencer_id: i64) -> Result<Option<i64>, LedgerError> {
            self.inner.vote_count(influencer_id).await
        }
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicate_missed_by_precheck() {
        let database = memory_database().await;
        let rose = seed_influencer(&database, "rose", "floral").await;
        let intake = test_intake(
            Arc::new(IndexOnlyStore {
                inner: VoteLedger::new(database.clone()),
            }),
            None,
            test_limiter(),
            test_cache(),
        );

        let first = intake
            .submit(
                &ballot_body("Ada", "ada@example.com", rose.id),
                &hints_for("192.0.2.110"),
            )
            .await;
        assert_eq!(
            first,
            VoteOutcome::Accepted {
                new_vote_count: Some(1)
            }
        );

        let second = intake
            .submit(
                &ballot_body("Ada", "ADA@example.com", rose.id),
                &hints_for("192.0.2.111"),
            )
            .await;
        assert_eq!(second, VoteOutcome::Rejected(VoteRejection::AlreadyVoted));
        assert_eq!(stored_votes(&database).await.len(), 1);
        assert_eq!(stored_count(&database, rose.id).await, 1);
    }

    #[test]
    fn parse_trims_and_bounds_fields() {
        let vote = ValidatedVote::parse(json!({
            "name": "  Ada  ",
            "email": " ada@example.com ",
            "influencerId": 7,
            "recaptchaToken": "   ",
        }))
        .expect("valid");
        assert_eq!(vote.name, "Ada");
        assert_eq!(vote.email, "ada@example.com");
        assert_eq!(vote.captcha_token, None);

        let long_name = "x".repeat(MAX_NAME_CHARS + 1);
        assert!(
            ValidatedVote::parse(json!({
                "name": long_name,
                "email": "ada@example.com",
                "influencerId": 7,
            }))
            .is_err()
        );
        assert!(
            ValidatedVote::parse(json!({
                "name": "Ada",
                "email": "ada@example.com",
                "influencerId": "7",
            }))
            .is_err()
        );
    }
}
