//! Field rules for creator records managed from the admin API.

use anyhow::{Result, anyhow};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_HANDLE_LEN: usize = 64;
pub const MAX_BIO_LEN: usize = 1000;
pub const MAX_URL_LEN: usize = 512;
pub const MAX_HASHTAGS: usize = 10;
pub const MAX_HASHTAG_LEN: usize = 50;

pub const CATEGORY_FLORAL: &str = "floral";
pub const CATEGORY_WOODY: &str = "woody";
pub const CATEGORY_FRESH: &str = "fresh";
pub const CATEGORIES: [&str; 3] = [CATEGORY_FLORAL, CATEGORY_WOODY, CATEGORY_FRESH];

pub fn canonicalize_name(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Name cannot be empty"));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(anyhow!("Name exceeds {MAX_NAME_LEN} character limit"));
    }
    Ok(trimmed.to_string())
}

/// `@Some.Creator` becomes `some.creator`.
pub fn canonicalize_handle(value: &str) -> Result<String> {
    let normalized = value.trim().trim_start_matches('@').to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(anyhow!("Handle cannot be empty"));
    }
    if normalized.len() > MAX_HANDLE_LEN {
        return Err(anyhow!("Handle exceeds {MAX_HANDLE_LEN} character limit"));
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(anyhow!(
            "Handle may only contain letters, digits, '.', '_' and '-'"
        ));
    }
    Ok(normalized)
}

pub fn canonicalize_bio(value: Option<&str>) -> Result<Option<String>> {
    let Some(trimmed) = value.map(str::trim).filter(|bio| !bio.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > MAX_BIO_LEN {
        return Err(anyhow!("Bio exceeds {MAX_BIO_LEN} character limit"));
    }
    Ok(Some(trimmed.to_string()))
}

pub fn canonicalize_media_url(label: &str, value: Option<&str>) -> Result<Option<String>> {
    let Some(trimmed) = value.map(str::trim).filter(|url| !url.is_empty()) else {
        return Ok(None);
    };
    if trimmed.len() > MAX_URL_LEN {
        return Err(anyhow!("{label} exceeds {MAX_URL_LEN} character limit"));
    }
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(anyhow!("{label} must be an http(s) URL"));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(anyhow!("{label} must not contain whitespace"));
    }
    Ok(Some(trimmed.to_string()))
}

/// Strips leading `#`, drops blanks and case-insensitive repeats.
pub fn canonicalize_hashtags(values: &[String]) -> Result<Vec<String>> {
    let mut tags: Vec<String> = Vec::with_capacity(values.len().min(MAX_HASHTAGS));
    for raw in values {
        let tag = raw.trim().trim_start_matches('#').trim();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > MAX_HASHTAG_LEN {
            return Err(anyhow!("Hashtag exceeds {MAX_HASHTAG_LEN} character limit"));
        }
        if tag.chars().any(char::is_whitespace) {
            return Err(anyhow!("Hashtag must not contain whitespace"));
        }
        if tags.iter().any(|existing| existing.eq_ignore_ascii_case(tag)) {
            continue;
        }
        tags.push(tag.to_string());
    }
    if tags.len() > MAX_HASHTAGS {
        return Err(anyhow!("At most {MAX_HASHTAGS} hashtags are allowed"));
    }
    Ok(tags)
}

pub fn normalize_category(value: &str) -> Result<&'static str> {
    let normalized = value.trim().to_ascii_lowercase();
    CATEGORIES
        .iter()
        .copied()
        .find(|category| *category == normalized)
        .ok_or_else(|| anyhow!("Unsupported category: {normalized}"))
}
