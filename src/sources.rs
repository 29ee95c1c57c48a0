//! # Source Directory
//!
//! Maps feed-level publisher strings (RSS channel titles, often noisy)
//! to canonical names and integer trust tiers in the range `1..=5`.
//!
//! - Case-insensitive lookup with normalization of punctuation and dashes.
//! - Aliases map alternative spellings to canonical names.
//! - Fallback order: aliases → exact match → substring match → default.
//! - Ships a built-in `default_seed()` with the monitored publishers.

use serde::Deserialize;
use std::collections::HashMap;

/// Canonical name used when a channel title matches nothing we know.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Publisher directory: trust tiers plus alias resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDirectory {
    /// Tier used when no match is found.
    #[serde(default = "default_tier")]
    pub default_tier: u8,
    /// Trust tiers (1–5) for canonical publisher names, keyed by
    /// normalized name.
    #[serde(default)]
    pub tiers: HashMap<String, u8>,
    /// Aliases mapping non-canonical names → canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Display names keyed by normalized canonical name.
    #[serde(default)]
    pub display: HashMap<String, String>,
}

fn default_tier() -> u8 {
    1
}

impl Default for SourceDirectory {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl SourceDirectory {
    /// Trust tier for a publisher string.
    ///
    /// Steps:
    /// 1. Alias lookup (normalized) → canonical → tier.
    /// 2. Exact tier match.
    /// 3. Substring fallback (e.g. "TechCrunch » Startups" → "techcrunch").
    /// 4. Default tier.
    pub fn tier_for(&self, source: &str) -> u8 {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            if let Some(&t) = self.tiers.get(&normalize(canon)) {
                return clamp_tier(t);
            }
        }

        if let Some(&t) = self.tiers.get(&s) {
            return clamp_tier(t);
        }

        for (k, &t) in &self.tiers {
            if s.contains(k.as_str()) {
                return clamp_tier(t);
            }
        }

        clamp_tier(self.default_tier)
    }

    /// Resolve a raw feed channel title to a canonical display name.
    /// Unknown publishers keep their raw (trimmed) title; an empty title
    /// becomes [`UNKNOWN_SOURCE`].
    pub fn canonical_name(&self, feed_title: &str) -> String {
        let s = normalize(feed_title);
        if s.is_empty() {
            return UNKNOWN_SOURCE.to_string();
        }

        let canon = self.aliases.get(&s).map(|c| normalize(c)).or_else(|| {
            if self.tiers.contains_key(&s) {
                Some(s.clone())
            } else {
                self.tiers.keys().find(|k| s.contains(k.as_str())).cloned()
            }
        });

        match canon {
            Some(c) => self
                .display
                .get(&c)
                .cloned()
                .unwrap_or_else(|| c.to_string()),
            None => feed_title.trim().to_string(),
        }
    }

    /// Built-in seed covering the monitored tech/crypto/ai publishers.
    pub fn default_seed() -> Self {
        let mut tiers = HashMap::new();
        let mut display = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, name, t) in [
            // Wire services
            ("reuters", "Reuters", 5u8),
            ("bbc", "BBC", 5),
            ("associated press", "Associated Press", 5),
            // Tech
            ("techcrunch", "TechCrunch", 4),
            ("the verge", "The Verge", 4),
            ("ars technica", "Ars Technica", 4),
            ("wired", "Wired", 4),
            // Crypto
            ("coindesk", "CoinDesk", 4),
            ("cointelegraph", "Cointelegraph", 3),
            ("decrypt", "Decrypt", 3),
            ("cryptonews", "CryptoNews", 3),
            // AI
            ("venturebeat", "VentureBeat", 3),
            ("ai news", "AI News", 3),
        ] {
            tiers.insert(k.to_string(), t);
            display.insert(k.to_string(), name.to_string());
        }

        for (a, c) in [
            ("ap news", "associated press"),
            ("bbc news", "bbc"),
            ("verge", "the verge"),
            ("arstechnica", "ars technica"),
            ("crypto news", "cryptonews"),
            ("artificial intelligence news", "ai news"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_tier: 1,
            tiers,
            aliases,
            display,
        }
    }
}

/// Normalize input string: lowercase, replace punctuation/dashes with
/// spaces, collapse multiple spaces into one.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\', '»', '|'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t', '.', ',', '\''], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp_tier(t: u8) -> u8 {
    t.clamp(1, 5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> SourceDirectory {
        SourceDirectory::default_seed()
    }

    #[test]
    fn exact_match() {
        assert_eq!(dir().tier_for("Reuters"), 5);
        assert_eq!(dir().tier_for("techcrunch"), 4);
    }

    #[test]
    fn alias_match() {
        let d = dir();
        assert_eq!(d.tier_for("AP News"), 5);
        assert_eq!(d.canonical_name("Verge"), "The Verge");
    }

    #[test]
    fn substring_match() {
        let d = dir();
        assert_eq!(d.tier_for("TechCrunch » Startups"), 4);
        assert_eq!(d.canonical_name("CoinDesk: Latest Headlines"), "CoinDesk");
    }

    #[test]
    fn default_tier_for_unknown() {
        assert_eq!(dir().tier_for("Totally Unknown Blog"), 1);
    }

    #[test]
    fn unknown_keeps_raw_name_empty_becomes_unknown() {
        let d = dir();
        assert_eq!(d.canonical_name("  Some Indie Blog  "), "Some Indie Blog");
        assert_eq!(d.canonical_name("   "), UNKNOWN_SOURCE);
    }

    #[test]
    fn dash_and_typography_normalization() {
        let d = dir();
        assert_eq!(d.tier_for("Ars—Technica"), 4);
        assert_eq!(d.tier_for("ars - technica"), 4);
    }

    #[test]
    fn tiers_are_clamped_to_scale() {
        let mut d = dir();
        d.tiers.insert("weird".into(), 9);
        assert_eq!(d.tier_for("weird"), 5);
    }
}
