//! Composite newsworthiness score and total posting order.
//!
//! Four independently tunable terms combined linearly:
//! source trust tier, cross-source corroboration, breaking-keyword
//! match, and exponential recency decay. Scores are rounded to 4
//! decimals so repeated runs over the same inputs compare equal.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashMap;

use crate::article::{Article, RankedArticle};
use crate::config::NewsConfig;

const SCORE_PRECISION: f64 = 10_000.0;

/// Normalize a title for corroboration matching: lowercase, strip
/// punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    static RE_PUNCT: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_punct = RE_PUNCT.get_or_init(|| Regex::new(r"[^a-z0-9\s]+").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let t = title.to_lowercase();
    let t = re_punct.replace_all(&t, " ");
    re_ws.replace_all(&t, " ").trim().to_string()
}

/// Score and sort candidates. Primary key: score descending; ties break
/// on `published_at` descending so output is reproducible regardless of
/// input order.
pub fn rank(items: Vec<Article>, cfg: &NewsConfig, now: DateTime<Utc>) -> Vec<RankedArticle> {
    let mut title_counts: HashMap<String, u32> = HashMap::new();
    for a in &items {
        *title_counts.entry(normalize_title(&a.title)).or_insert(0) += 1;
    }

    let w = &cfg.weights;
    let mut scored: Vec<RankedArticle> = items
        .into_iter()
        .map(|a| {
            let tier = cfg.sources.tier_for(&a.source);

            let corroboration = *title_counts
                .get(&normalize_title(&a.title))
                .unwrap_or(&1);

            let title_lc = a.title.to_lowercase();
            let is_breaking = cfg
                .breaking_keywords_for(&a.category)
                .iter()
                .any(|kw| title_lc.contains(kw));

            // Clock skew into the future counts as age zero, never as a
            // negative age boosting the score.
            let age_hours = ((now - a.published_at).num_seconds() as f64 / 3600.0).max(0.0);
            let recency = (-age_hours / w.half_life_hours).exp();

            let score = w.w_source * f64::from(tier)
                + w.w_corroboration * f64::from(corroboration - 1)
                + w.w_breaking * if is_breaking { 1.0 } else { 0.0 }
                + w.w_recency * recency;

            RankedArticle {
                article: a,
                score: round4(score),
                age_hours: (age_hours * 100.0).round() / 100.0,
                corroboration,
                is_breaking,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.article.published_at.cmp(&a.article.published_at))
    });
    scored
}

fn round4(x: f64) -> f64 {
    (x * SCORE_PRECISION).round() / SCORE_PRECISION
}
