// tests/post_cycle.rs
// Posting-cycle properties: no double post, rate-limit halt, failure
// marking, dry-run accounting.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use news_autoposter::article::{Article, RankedArticle};
use news_autoposter::composer::DisabledComposer;
use news_autoposter::config::NewsConfig;
use news_autoposter::poster::{PostOutcome, Poster};
use news_autoposter::scheduler::{Clock, PostingPipeline};
use news_autoposter::store::ArticleStore;

struct TestClock;

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap()
    }
    async fn sleep(&self, _dur: Duration) {}
}

/// Plays back a fixed script of outcomes and records every text posted.
struct ScriptedPoster {
    script: Mutex<Vec<PostOutcome>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPoster {
    fn new(script: Vec<PostOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: Mutex::new(vec![]),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Poster for ScriptedPoster {
    async fn post(&self, text: &str) -> PostOutcome {
        self.calls.lock().unwrap().push(text.to_string());
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            PostOutcome::Posted("late".into())
        } else {
            script.remove(0)
        }
    }
}

fn candidate(n: usize) -> RankedArticle {
    let article = Article::new(
        format!("id-{n}"),
        format!("Headline {n}"),
        String::new(),
        format!("https://example.com/{n}"),
        "Reuters".to_string(),
        "tech".to_string(),
        Utc.with_ymd_and_hms(2025, 3, 3, 11, 0, 0).unwrap(),
    );
    RankedArticle {
        article,
        score: 10.0 - n as f64,
        age_hours: 1.0,
        corroboration: 1,
        is_breaking: false,
    }
}

fn pipeline(cfg: NewsConfig, poster: Arc<ScriptedPoster>, dir: &tempfile::TempDir) -> PostingPipeline {
    let store = ArticleStore::load(dir.path().join("processed.json"));
    PostingPipeline::new(cfg, store, Arc::new(DisabledComposer), poster, Arc::new(TestClock))
}

#[tokio::test]
async fn already_posted_items_never_reach_the_poster() {
    let dir = tempfile::tempdir().unwrap();
    let poster = ScriptedPoster::new(vec![PostOutcome::Posted("1".into())]);
    let mut p = pipeline(NewsConfig::default(), poster.clone(), &dir);

    let first = candidate(1);
    p.store.add(first.article.fingerprint.clone());

    let posted = p.post_batch(&[first, candidate(2)], 5).await;
    assert_eq!(posted, 1);
    assert_eq!(poster.call_count(), 1);
    assert!(poster.calls.lock().unwrap()[0].contains("Headline 2"));
}

#[tokio::test]
async fn rate_limit_halts_the_cycle_without_marking() {
    let dir = tempfile::tempdir().unwrap();
    let poster = ScriptedPoster::new(vec![
        PostOutcome::Posted("1".into()),
        PostOutcome::RateLimited(Some(120)),
    ]);
    let mut p = pipeline(NewsConfig::default(), poster.clone(), &dir);

    let ranked: Vec<_> = (1..=5).map(candidate).collect();
    let posted = p.post_batch(&ranked, 5).await;

    assert_eq!(posted, 1);
    assert_eq!(poster.call_count(), 2); // 2nd call hit the limit, 3rd..5th never tried
    assert!(p.store.contains(&ranked[0].article.fingerprint));
    // the rate-limited item stays eligible for the next cycle
    assert!(!p.store.contains(&ranked[1].article.fingerprint));
    assert_eq!(p.store.len(), 1);
}

#[tokio::test]
async fn non_rate_limit_failure_marks_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let poster = ScriptedPoster::new(vec![
        PostOutcome::Failed("500 from platform".into()),
        PostOutcome::Posted("2".into()),
    ]);
    let mut p = pipeline(NewsConfig::default(), poster.clone(), &dir);

    let ranked: Vec<_> = (1..=2).map(candidate).collect();
    let posted = p.post_batch(&ranked, 5).await;

    assert_eq!(posted, 1);
    // the failed item is marked handled so it is not retried forever
    assert!(p.store.contains(&ranked[0].article.fingerprint));
    assert!(p.store.contains(&ranked[1].article.fingerprint));
}

#[tokio::test]
async fn dry_run_marks_up_to_cap_without_posting() {
    let dir = tempfile::tempdir().unwrap();
    let poster = ScriptedPoster::new(vec![]);
    let cfg = NewsConfig {
        auto_post: false,
        ..NewsConfig::default()
    };
    let mut p = pipeline(cfg, poster.clone(), &dir);

    let ranked: Vec<_> = (1..=3).map(candidate).collect();
    let posted = p.post_batch(&ranked, 2).await;

    assert_eq!(posted, 2);
    assert_eq!(poster.call_count(), 0);
    assert_eq!(p.store.len(), 2);
    assert!(p.store.contains(&ranked[0].article.fingerprint));
    assert!(p.store.contains(&ranked[1].article.fingerprint));
    assert!(!p.store.contains(&ranked[2].article.fingerprint));
}

#[tokio::test]
async fn cap_limits_posts_and_state_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let poster = ScriptedPoster::new(vec![
        PostOutcome::Posted("1".into()),
        PostOutcome::Posted("2".into()),
    ]);
    let mut p = pipeline(NewsConfig::default(), poster.clone(), &dir);

    let ranked: Vec<_> = (1..=4).map(candidate).collect();
    let posted = p.post_batch(&ranked, 2).await;
    assert_eq!(posted, 2);
    assert_eq!(poster.call_count(), 2);

    // the ledger survives a restart
    let reloaded = ArticleStore::load(dir.path().join("processed.json"));
    assert_eq!(reloaded.len(), 2);
}

#[tokio::test]
async fn posting_follows_rank_order() {
    let dir = tempfile::tempdir().unwrap();
    let poster = ScriptedPoster::new(vec![]);
    let mut p = pipeline(NewsConfig::default(), poster.clone(), &dir);

    let ranked: Vec<_> = (1..=3).map(candidate).collect();
    p.post_batch(&ranked, 3).await;

    let calls = poster.calls.lock().unwrap();
    assert!(calls[0].contains("Headline 1"));
    assert!(calls[1].contains("Headline 2"));
    assert!(calls[2].contains("Headline 3"));
}
