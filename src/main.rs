//! Binary entrypoint: resolves configuration, wires the pipeline, and
//! runs one cycle or the long-running loop.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_autoposter::composer::{Composer, DisabledComposer, LlmComposer};
use news_autoposter::poster::{HttpPoster, PostOutcome, Poster};
use news_autoposter::scheduler::{NewsLoop, PostingPipeline, SystemClock};
use news_autoposter::store::{ArticleStore, DEFAULT_STORE_PATH};
use news_autoposter::{Aggregator, NewsConfig, RssFeedSource};

#[derive(Parser, Debug)]
#[command(name = "news-autoposter", about = "RSS news aggregation and auto-posting bot")]
struct Cli {
    /// Fetch, rank, post up to the cap, then exit.
    #[arg(long)]
    once: bool,

    /// Run the scheduled loop until interrupted.
    #[arg(long = "loop")]
    run_loop: bool,

    /// Override the per-cycle post cap.
    #[arg(long)]
    max_posts: Option<usize>,

    /// Override the fetch budget.
    #[arg(long)]
    fetch_total: Option<usize>,

    /// Explicit config file (TOML); defaults to $NEWS_CONFIG_PATH or
    /// config/news.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Processed-article ledger location.
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_autoposter=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Dry-run sink: credentials are not required, nothing is transmitted.
/// `post_batch` never invokes the poster with auto-post off, but the
/// pipeline still needs one wired.
struct NullPoster;

#[async_trait::async_trait]
impl Poster for NullPoster {
    async fn post(&self, _text: &str) -> PostOutcome {
        PostOutcome::Failed("posting disabled".to_string())
    }
}

fn build_loop(cli: &Cli) -> Result<NewsLoop> {
    let mut cfg = NewsConfig::resolve(cli.config.as_deref()).context("resolving configuration")?;
    if let Some(n) = cli.max_posts {
        cfg.max_posts_per_cycle = n;
    }
    if let Some(n) = cli.fetch_total {
        cfg.fetch_budget = n;
    }
    cfg.validate().context("invalid configuration")?;

    // Posting credentials are mandatory unless running dry. The client
    // itself connects on demand, at the first actual post.
    let poster: Arc<dyn Poster> = if cfg.auto_post {
        Arc::new(HttpPoster::from_env().context("posting is enabled but credentials are missing")?)
    } else {
        tracing::info!("auto-post disabled, running dry");
        Arc::new(NullPoster)
    };

    let composer: Arc<dyn Composer> = match LlmComposer::from_env()? {
        Some(llm) => Arc::new(llm),
        None => {
            tracing::info!("no LLM credentials, posts will use raw titles");
            Arc::new(DisabledComposer)
        }
    };

    let store = ArticleStore::load(&cli.store);
    tracing::info!(
        fingerprints = store.len(),
        path = %cli.store.display(),
        "loaded processed-article ledger"
    );

    let feed_source = Arc::new(RssFeedSource::new(Duration::from_secs(15))?);
    let aggregator = Aggregator::new(feed_source, &cfg);
    let pipeline = PostingPipeline::new(cfg, store, composer, poster, Arc::new(SystemClock));
    Ok(NewsLoop::new(pipeline, aggregator))
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = ?e, "fatal");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.once && !cli.run_loop {
        anyhow::bail!("pass --once or --loop (see --help)");
    }

    let mut news_loop = build_loop(&cli)?;

    if cli.once {
        let posted = news_loop.run_once(cli.fetch_total, cli.max_posts).await?;
        tracing::info!(posted, "done");
        return Ok(());
    }

    // Graceful shutdown: finish the current cycle's persistence, then exit.
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down after current cycle");
            let _ = tx.send(true);
        }
    });

    news_loop.run(rx).await;
    Ok(())
}
