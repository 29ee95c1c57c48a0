//! Cycle orchestration: fetch → rank → post → persist → sleep.
//!
//! One cycle runs to completion before the next begins. Any error inside
//! a cycle is caught at the cycle boundary and logged; the long-running
//! loop only ever exits on shutdown. The clock is injectable so tests
//! can drive many cycles without wall-clock delay.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::aggregator::Aggregator;
use crate::article::RankedArticle;
use crate::composer::{compose_post, Composer};
use crate::config::NewsConfig;
use crate::poster::{PostOutcome, Poster};
use crate::ranker::rank;
use crate::store::ArticleStore;

/// Time source and sleeper, injectable for tests.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, dur: Duration);
}

pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
    async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}

/// One-time metrics registration (facade only; an exporter may or may
/// not be installed by the embedding process).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_cycles_total", "Completed posting cycles.");
        describe_counter!("news_posted_total", "Articles successfully posted.");
        describe_counter!("news_rate_limited_total", "Cycles halted by a rate-limit signal.");
        describe_counter!("news_post_failures_total", "Non-rate-limit post failures.");
        describe_counter!("aggregator_feed_errors_total", "Per-feed fetch/parse errors.");
        describe_counter!("aggregator_dedup_total", "Candidates dropped as duplicates.");
        describe_counter!("aggregator_articles_total", "Candidates surviving dedup.");
    });
}

/// What a cycle did, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Quiet hours: no fetch, no post.
    Quiet,
    /// Fetch produced nothing; informational, not an error.
    Idle,
    Completed { fetched: usize, posted: usize },
}

/// The posting half of a cycle: owns the processed-article ledger and
/// the two external collaborators.
pub struct PostingPipeline {
    pub cfg: NewsConfig,
    pub store: ArticleStore,
    composer: Arc<dyn Composer>,
    poster: Arc<dyn Poster>,
    clock: Arc<dyn Clock>,
}

impl PostingPipeline {
    pub fn new(
        cfg: NewsConfig,
        store: ArticleStore,
        composer: Arc<dyn Composer>,
        poster: Arc<dyn Poster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ensure_metrics_described();
        Self {
            cfg,
            store,
            composer,
            poster,
            clock,
        }
    }

    /// Walk the ranked pool in order and post up to `max_posts` items.
    ///
    /// Rules, in order, per candidate:
    /// - already handled → skip;
    /// - dry-run → log the composed text, mark handled, counts toward
    ///   the cap, poster never invoked;
    /// - `Posted` → mark handled, flush, short pause, continue;
    /// - `RateLimited` → stop the cycle, do NOT mark (retried next cycle);
    /// - `Failed` → mark handled (no endless retry), continue.
    ///
    /// The ledger is flushed once more at the end regardless.
    pub async fn post_batch(&mut self, ranked: &[RankedArticle], max_posts: usize) -> usize {
        let mut posted = 0usize;

        for candidate in ranked {
            if posted >= max_posts {
                break;
            }
            let fp = &candidate.article.fingerprint;
            if self.store.contains(fp) {
                continue;
            }

            let text = compose_post(self.composer.as_ref(), &candidate.article, &self.cfg).await;

            if !self.cfg.auto_post {
                tracing::info!(score = candidate.score, "(dry-run) {text}");
                self.store.add(fp.clone());
                posted += 1;
                continue;
            }

            match self.poster.post(&text).await {
                PostOutcome::Posted(id) => {
                    posted += 1;
                    self.store.add(fp.clone());
                    // Flush per confirmed post: a crash after this point
                    // cannot double-post this item.
                    if let Err(e) = self.store.flush() {
                        tracing::warn!(error = ?e, "store flush after post failed");
                    }
                    counter!("news_posted_total").increment(1);
                    tracing::info!(post_id = %id, score = candidate.score, "posted: {text}");
                    self.clock
                        .sleep(Duration::from_secs(self.cfg.post_pause_secs))
                        .await;
                }
                PostOutcome::RateLimited(retry_after) => {
                    // Expected backoff event, not an error. The item stays
                    // unmarked and will be retried next cycle.
                    counter!("news_rate_limited_total").increment(1);
                    tracing::info!(?retry_after, "rate limited, stopping this cycle");
                    break;
                }
                PostOutcome::Failed(reason) => {
                    counter!("news_post_failures_total").increment(1);
                    tracing::warn!(%reason, "post failed, skipping this item permanently");
                    self.store.add(fp.clone());
                }
            }
        }

        if let Err(e) = self.store.flush() {
            tracing::warn!(error = ?e, "store flush at cycle end failed");
        }
        posted
    }
}

/// The full loop: aggregation glued to the posting pipeline.
pub struct NewsLoop {
    pipeline: PostingPipeline,
    aggregator: Aggregator,
}

impl NewsLoop {
    pub fn new(pipeline: PostingPipeline, aggregator: Aggregator) -> Self {
        Self {
            pipeline,
            aggregator,
        }
    }

    fn cfg(&self) -> &NewsConfig {
        &self.pipeline.cfg
    }

    /// Per-cycle post cap, halved on reduced-frequency days (floor 1).
    fn effective_cap(&self, now: DateTime<Utc>) -> usize {
        let base = self.cfg().max_posts_per_cycle;
        if self.cfg().should_reduce_frequency(now) {
            std::cmp::max(1, base / 2)
        } else {
            base
        }
    }

    /// Fetch budget: configured floor, raised to 10x the post cap so the
    /// ranker sees a meaningful pool.
    fn fetch_budget(&self, cap: usize) -> usize {
        std::cmp::max(self.cfg().fetch_budget, cap * 10)
    }

    /// One scheduled cycle, quiet hours included.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let now = self.pipeline.clock.now();
        if self.cfg().is_quiet_hour(now) {
            tracing::info!("quiet hours, skipping this cycle");
            return Ok(CycleOutcome::Quiet);
        }

        let cap = self.effective_cap(now);
        let budget = self.fetch_budget(cap);
        let cats = self.cfg().categories.clone();

        let raw = self.aggregator.fetch_categories(&cats, budget, now).await;
        if raw.is_empty() {
            tracing::info!("no articles fetched, nothing to do");
            return Ok(CycleOutcome::Idle);
        }

        let fetched = raw.len();
        let ranked = rank(raw, &self.pipeline.cfg, now);
        let posted = self.pipeline.post_batch(&ranked, cap).await;
        counter!("news_cycles_total").increment(1);
        Ok(CycleOutcome::Completed { fetched, posted })
    }

    /// One-shot mode for the CLI: fetch, rank, post up to the cap, exit.
    /// Ignores quiet hours and weekend reduction; the operator asked.
    pub async fn run_once(
        &mut self,
        fetch_total: Option<usize>,
        max_posts: Option<usize>,
    ) -> Result<usize> {
        let now = self.pipeline.clock.now();
        let cap = max_posts.unwrap_or(self.cfg().max_posts_per_cycle);
        let budget = fetch_total.unwrap_or_else(|| self.fetch_budget(cap));
        let cats = self.cfg().categories.clone();

        let raw = self.aggregator.fetch_categories(&cats, budget, now).await;
        if raw.is_empty() {
            tracing::info!("no articles fetched, nothing to do");
            return Ok(0);
        }
        let ranked = rank(raw, &self.pipeline.cfg, now);
        let posted = self.pipeline.post_batch(&ranked, cap).await;
        Ok(posted)
    }

    /// Library helper: the current ranked view of one category (or all),
    /// without touching the posted-state ledger.
    pub async fn latest_news(
        &self,
        category: Option<&str>,
        max_total: usize,
    ) -> Vec<RankedArticle> {
        let now = self.pipeline.clock.now();
        let cats: Vec<String> = match category {
            Some(c) if self.cfg().rss_feeds.contains_key(c) => vec![c.to_string()],
            _ => self.cfg().categories.clone(),
        };
        let raw = self.aggregator.fetch_categories(&cats, max_total, now).await;
        let mut ranked = rank(raw, &self.pipeline.cfg, now);
        ranked.truncate(max_total);
        ranked
    }

    /// Run forever: cycle, sleep, repeat. A cycle error is logged and the
    /// loop proceeds; only a shutdown signal ends it, after a final
    /// ledger flush.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let interval =
            Duration::from_secs(std::cmp::max(30, self.cfg().update_interval_secs));
        tracing::info!(
            interval_secs = interval.as_secs(),
            max_per_cycle = self.cfg().max_posts_per_cycle,
            categories = ?self.cfg().categories,
            auto_post = self.cfg().auto_post,
            "starting news loop"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_cycle().await {
                Ok(CycleOutcome::Completed { fetched, posted }) => {
                    tracing::info!(fetched, posted, "cycle done");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = ?e, "cycle error");
                }
            }

            let clock = Arc::clone(&self.pipeline.clock);
            tokio::select! {
                _ = clock.sleep(interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.pipeline.store.flush() {
            tracing::warn!(error = ?e, "final store flush failed");
        }
        tracing::info!("news loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FixedClock(DateTime<Utc>);

    #[async_trait]
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
        async fn sleep(&self, _dur: Duration) {}
    }

    struct NeverPoster;

    #[async_trait]
    impl Poster for NeverPoster {
        async fn post(&self, _text: &str) -> PostOutcome {
            panic!("poster must not be invoked");
        }
    }

    struct EmptyFeed;

    #[async_trait]
    impl crate::feed::FeedSource for EmptyFeed {
        async fn fetch(&self, _url: &str, _limit: usize) -> Result<Vec<crate::feed::FeedEntry>> {
            Ok(vec![])
        }
    }

    fn news_loop(cfg: NewsConfig, at: DateTime<Utc>) -> NewsLoop {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::load(dir.path().join("p.json"));
        let aggregator = Aggregator::new(Arc::new(EmptyFeed), &cfg);
        let pipeline = PostingPipeline::new(
            cfg,
            store,
            Arc::new(crate::composer::DisabledComposer),
            Arc::new(NeverPoster),
            Arc::new(FixedClock(at)),
        );
        NewsLoop::new(pipeline, aggregator)
    }

    #[tokio::test]
    async fn quiet_hours_skip_fetch_and_post() {
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 23, 30, 0).unwrap();
        let mut nl = news_loop(NewsConfig::default(), at);
        assert_eq!(nl.run_cycle().await.unwrap(), CycleOutcome::Quiet);
    }

    #[tokio::test]
    async fn empty_fetch_is_idle_not_an_error() {
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        let mut nl = news_loop(NewsConfig::default(), at);
        assert_eq!(nl.run_cycle().await.unwrap(), CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn weekend_halves_the_cap_with_floor_of_one() {
        let sat = Utc.with_ymd_and_hms(2025, 1, 4, 12, 0, 0).unwrap();
        let mon = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();

        let nl = news_loop(NewsConfig::default(), sat);
        assert_eq!(nl.effective_cap(sat), 2); // 5 / 2
        assert_eq!(nl.effective_cap(mon), 5);

        let cfg = NewsConfig {
            max_posts_per_cycle: 1,
            ..NewsConfig::default()
        };
        let nl = news_loop(cfg, sat);
        assert_eq!(nl.effective_cap(sat), 1);
    }

    #[tokio::test]
    async fn fetch_budget_scales_with_cap() {
        let at = Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap();
        let nl = news_loop(NewsConfig::default(), at);
        assert_eq!(nl.fetch_budget(5), 60); // configured floor wins
        assert_eq!(nl.fetch_budget(20), 200);
    }
}
