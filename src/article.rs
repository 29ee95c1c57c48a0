//! Candidate article model and the fingerprint used as the dedup /
//! posted-state key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One normalized news item as it flows through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    /// Stable external identifier: feed guid, or link, or title,
    /// first non-empty wins.
    pub id: String,
    /// Short hash of `id`; the only key persisted across runs.
    pub fingerprint: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    /// Canonical publisher name, `"Unknown"` when unresolvable.
    pub source: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
}

impl Article {
    pub fn new(
        id: String,
        title: String,
        summary: String,
        link: String,
        source: String,
        category: String,
        published_at: DateTime<Utc>,
    ) -> Self {
        let fingerprint = fingerprint(&id);
        Self {
            id,
            fingerprint,
            title,
            summary,
            link,
            source,
            category,
            published_at,
        }
    }
}

/// Deterministic short hash of an article identifier: first 16 hex chars
/// of SHA-256. Collision-tolerant at human scale.
pub fn fingerprint(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// An article plus its computed rank. Produced fresh each cycle, never
/// persisted; ordering is the only externally meaningful property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedArticle {
    #[serde(flatten)]
    pub article: Article,
    /// Weighted sum of the four scoring terms, rounded to 4 decimals.
    pub score: f64,
    pub age_hours: f64,
    /// How many fetched items shared this normalized title.
    pub corroboration: u32,
    pub is_breaking: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_pure_and_fixed_width() {
        let a = fingerprint("https://example.com/story-1");
        let b = fingerprint("https://example.com/story-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_ids_give_distinct_fingerprints() {
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }
}
