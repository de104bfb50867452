use sha2::{Digest, Sha256};

/// Salted one-way hashing of voter identifiers. The salt is a deployment
/// secret; the same salt must be used for the lifetime of a campaign or
/// duplicate detection breaks.
#[derive(Clone)]
pub struct VoterHasher {
    salt: String,
}

impl VoterHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        let salt = salt.into();
        assert!(!salt.trim().is_empty(), "Hash salt must not be empty");
        Self { salt }
    }

    pub fn hash_email(&self, email: &str) -> String {
        self.digest(&normalize_email(email))
    }

    pub fn hash_client(&self, client: &str) -> String {
        self.digest(client.trim())
    }

    fn digest(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(value.as_bytes());
        let encoded = hex::encode(hasher.finalize());
        assert_eq!(encoded.len(), 64, "SHA-256 hex digest must be 64 chars");
        encoded
    }
}

impl std::fmt::Debug for VoterHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoterHasher")
            .field("salt", &"<redacted>")
            .finish()
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Log-safe form of an email address: `v***@example.com`.
pub fn mask_email(email: &str) -> String {
    let normalized = normalize_email(email);
    match normalized.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}

/// First characters of a stored hash, enough to correlate rows in reports.
pub fn hash_prefix(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}
