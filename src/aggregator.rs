//! Turns configured category feed lists into one deduplicated,
//! freshness-sorted candidate pool. Per-feed failures cost that feed's
//! articles and nothing else.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::article::Article;
use crate::config::NewsConfig;
use crate::feed::{FeedEntry, FeedSource};
use crate::sources::SourceDirectory;

pub struct Aggregator {
    source: Arc<dyn FeedSource>,
    feeds: HashMap<String, Vec<String>>,
    directory: SourceDirectory,
}

impl Aggregator {
    pub fn new(source: Arc<dyn FeedSource>, cfg: &NewsConfig) -> Self {
        Self {
            source,
            feeds: cfg.rss_feeds.clone(),
            directory: cfg.sources.clone(),
        }
    }

    /// Fetch the given categories up to a total article budget.
    ///
    /// The budget is divided evenly across each category's feeds (at
    /// least 1 per feed). Output is deduplicated by fingerprint (first
    /// occurrence wins) and sorted by `published_at` descending.
    pub async fn fetch_categories(
        &self,
        categories: &[String],
        max_total: usize,
        now: DateTime<Utc>,
    ) -> Vec<Article> {
        let mut items = Vec::new();
        for category in categories {
            let urls = match self.feeds.get(category) {
                Some(u) if !u.is_empty() => u,
                _ => {
                    tracing::debug!(category, "no feeds configured for category");
                    continue;
                }
            };
            let per_feed = std::cmp::max(1, max_total / urls.len());
            for url in urls {
                match self.source.fetch(url, per_feed).await {
                    Ok(entries) => {
                        for entry in entries {
                            if let Some(article) = self.to_article(entry, category, now) {
                                items.push(article);
                            }
                        }
                    }
                    Err(e) => {
                        // Partial failure is expected; the cycle goes on.
                        tracing::warn!(url, error = ?e, "feed fetch failed");
                        counter!("aggregator_feed_errors_total").increment(1);
                    }
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
        let mut out = Vec::with_capacity(items.len());
        let mut duplicates = 0u64;
        for article in items {
            if seen.insert(article.fingerprint.clone()) {
                out.push(article);
            } else {
                duplicates += 1;
            }
        }
        counter!("aggregator_dedup_total").increment(duplicates);
        counter!("aggregator_articles_total").increment(out.len() as u64);

        out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        out
    }

    /// Convert one feed entry into a valid candidate, or drop it.
    ///
    /// Id priority: guid, link, title. An entry lacking any of title,
    /// link, id is excluded. An entry without a publish time is stamped
    /// `now`, which makes it maximally recent to the ranker (explicit
    /// policy inherited from the source system).
    fn to_article(
        &self,
        entry: FeedEntry,
        category: &str,
        now: DateTime<Utc>,
    ) -> Option<Article> {
        let title = entry.title?;
        let link = entry.link?;
        let id = entry
            .guid
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| link.clone());

        let source = self
            .directory
            .canonical_name(entry.feed_title.as_deref().unwrap_or(""));

        Some(Article::new(
            id,
            title,
            entry.summary.unwrap_or_default(),
            link,
            source,
            category.to_string(),
            entry.published.unwrap_or(now),
        ))
    }
}
