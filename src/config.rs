//! Runtime configuration, resolved once at startup through an ordered
//! override chain: hardcoded defaults < optional TOML file < environment.
//! Components receive the resolved value explicitly; nothing re-reads
//! the environment mid-run.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sources::SourceDirectory;

pub const ENV_CONFIG_PATH: &str = "NEWS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/news.toml";

/// Weights of the four scoring terms. Tunable configuration, not physics.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    pub w_source: f64,
    pub w_corroboration: f64,
    pub w_breaking: f64,
    pub w_recency: f64,
    /// Recency half-life in hours for `exp(-age / half_life)`.
    pub half_life_hours: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            w_source: 1.2,
            w_corroboration: 1.0,
            w_breaking: 1.0,
            w_recency: 2.0,
            half_life_hours: 6.0,
        }
    }
}

/// Daily window during which the loop neither fetches nor posts.
/// Wrap-aware: `22:00 → 06:00` spans midnight, `01:00 → 05:00` does not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .with_context(|| format!("invalid quiet-hours time {s:?}, expected HH:MM"))
        };
        Ok(Self {
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl<'de> Deserialize<'de> for QuietHours {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw: [String; 2] = Deserialize::deserialize(d)?;
        QuietHours::parse(&raw[0], &raw[1]).map_err(serde::de::Error::custom)
    }
}

/// Fully resolved bot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// Seconds between cycles (the loop clamps to a 30s floor).
    pub update_interval_secs: u64,
    /// Category tags to monitor; each maps to a feed list below.
    pub categories: Vec<String>,
    pub rss_feeds: HashMap<String, Vec<String>>,
    /// Per-cycle post cap.
    pub max_posts_per_cycle: usize,
    /// Fetch budget per cycle; the loop raises it to 10x the post cap
    /// so the ranker always sees a meaningful pool.
    pub fetch_budget: usize,
    /// Keywords that mark a title as breaking news (any category).
    pub breaking_keywords: Vec<String>,
    /// Extra breaking keywords applied only within the crypto category.
    pub crypto_breaking_keywords: Vec<String>,
    pub quiet_hours: Option<QuietHours>,
    pub weekend_reduced_frequency: bool,
    /// When false (dry-run), composed posts are logged, not transmitted,
    /// but still recorded as handled.
    pub auto_post: bool,
    /// Pause between successive successful posts.
    pub post_pause_secs: u64,
    /// Append a category hashtag to composed posts.
    pub hashtags: bool,
    pub weights: ScoreWeights,
    pub sources: SourceDirectory,
}

impl Default for NewsConfig {
    fn default() -> Self {
        let mut rss_feeds = HashMap::new();
        rss_feeds.insert(
            "tech".to_string(),
            vec![
                "https://techcrunch.com/feed/".to_string(),
                "https://www.theverge.com/rss/index.xml".to_string(),
                "https://feeds.arstechnica.com/arstechnica/index".to_string(),
                "https://www.wired.com/feed/rss".to_string(),
            ],
        );
        rss_feeds.insert(
            "crypto".to_string(),
            vec![
                "https://www.coindesk.com/arc/outboundfeeds/rss/".to_string(),
                "https://cointelegraph.com/rss".to_string(),
                "https://cryptonews.com/feed/".to_string(),
                "https://decrypt.co/feed".to_string(),
            ],
        );
        rss_feeds.insert(
            "ai".to_string(),
            vec![
                "https://venturebeat.com/ai/feed/".to_string(),
                "https://www.artificialintelligence-news.com/feed/".to_string(),
                "https://hai.stanford.edu/news/rss.xml".to_string(),
            ],
        );

        Self {
            update_interval_secs: 3600,
            categories: vec!["tech".into(), "crypto".into(), "ai".into()],
            rss_feeds,
            max_posts_per_cycle: 5,
            fetch_budget: 60,
            breaking_keywords: [
                "breaking",
                "urgent",
                "alert",
                "major announcement",
                "significant",
                "crash",
                "surge",
                "record high",
                "record low",
                "first time",
                "unprecedented",
                "massive",
                "huge",
                "emergency",
                "critical",
            ]
            .map(String::from)
            .to_vec(),
            crypto_breaking_keywords: [
                "bitcoin",
                "btc",
                "ethereum",
                "eth",
                "crash",
                "surge",
                "all-time high",
                "ath",
                "moon",
                "dump",
            ]
            .map(String::from)
            .to_vec(),
            quiet_hours: Some(QuietHours::parse("22:00", "06:00").expect("builtin quiet hours")),
            weekend_reduced_frequency: true,
            auto_post: true,
            post_pause_secs: 3,
            hashtags: true,
            weights: ScoreWeights::default(),
            sources: SourceDirectory::default_seed(),
        }
    }
}

impl NewsConfig {
    /// Resolve configuration: defaults, then the TOML file (explicit path,
    /// `$NEWS_CONFIG_PATH`, or `config/news.toml` if present), then
    /// environment overrides.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        let mut cfg = match config_file_path(explicit_path)? {
            Some(p) => Self::from_toml_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Environment overrides, applied last in the chain.
    fn apply_env(&mut self) {
        if let Some(v) = env_parse::<u64>("NEWS_UPDATE_INTERVAL") {
            self.update_interval_secs = v;
        }
        let cats = csv_env("NEWS_CATEGORIES");
        if !cats.is_empty() {
            self.categories = cats;
        }
        if let Ok(v) = std::env::var("NEWS_AUTO_POST") {
            self.auto_post = v.to_ascii_lowercase() != "false";
        }
        if let Some(v) = env_parse::<usize>("NEWS_MAX_ARTICLES_PER_UPDATE") {
            self.max_posts_per_cycle = v;
        }
        if let Some(v) = env_parse::<usize>("NEWS_FETCH_MAX_TOTAL") {
            self.fetch_budget = v;
        }

        // Extra feed URLs merge into the `general` category.
        let extra = csv_env("NEWS_SOURCES");
        if !extra.is_empty() {
            let feeds = self.rss_feeds.entry("general".to_string()).or_default();
            for url in extra {
                if !feeds.contains(&url) {
                    feeds.push(url);
                }
            }
            if !self.categories.iter().any(|c| c == "general") {
                self.categories.push("general".to_string());
            }
        }
    }

    /// Startup validation. Failing here is the only fatal error class.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            bail!("no categories configured");
        }
        let resolvable = self
            .categories
            .iter()
            .filter_map(|c| self.rss_feeds.get(c))
            .map(|feeds| feeds.len())
            .sum::<usize>();
        if resolvable == 0 {
            bail!(
                "no resolvable feeds for categories {:?}",
                self.categories
            );
        }
        if self.max_posts_per_cycle == 0 {
            bail!("max_posts_per_cycle must be at least 1");
        }
        if self.weights.half_life_hours <= 0.0 {
            bail!("recency half-life must be positive");
        }
        Ok(())
    }

    pub fn is_quiet_hour(&self, now: DateTime<Utc>) -> bool {
        match self.quiet_hours {
            Some(q) => {
                // Seconds precision is enough for an hourly window.
                let t = NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
                    .unwrap_or(NaiveTime::MIN);
                q.contains(t)
            }
            None => false,
        }
    }

    /// Weekends run with a halved post cap when the flag is set.
    pub fn should_reduce_frequency(&self, now: DateTime<Utc>) -> bool {
        self.weekend_reduced_frequency
            && matches!(
                now.weekday(),
                chrono::Weekday::Sat | chrono::Weekday::Sun
            )
    }

    /// Breaking keyword list for a category: the general list, extended
    /// by the crypto list inside the crypto category only.
    pub fn breaking_keywords_for(&self, category: &str) -> Vec<&str> {
        let mut kws: Vec<&str> = self.breaking_keywords.iter().map(String::as_str).collect();
        if category == "crypto" {
            kws.extend(self.crypto_breaking_keywords.iter().map(String::as_str));
        }
        kws
    }
}

fn config_file_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(p) = explicit {
        if !p.exists() {
            return Err(anyhow!("config file {} does not exist", p.display()));
        }
        return Ok(Some(p.to_path_buf()));
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        return Ok(Some(pb));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default.exists() {
        return Ok(Some(default));
    }
    Ok(None)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn csv_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
