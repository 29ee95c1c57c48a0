// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod aggregator;
pub mod article;
pub mod composer;
pub mod config;
pub mod feed;
pub mod poster;
pub mod ranker;
pub mod scheduler;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::aggregator::Aggregator;
pub use crate::article::{Article, RankedArticle};
pub use crate::composer::{Composer, DisabledComposer, LlmComposer};
pub use crate::config::NewsConfig;
pub use crate::feed::{FeedEntry, FeedSource, RssFeedSource};
pub use crate::poster::{HttpPoster, PostOutcome, Poster};
pub use crate::scheduler::{Clock, CycleOutcome, NewsLoop, PostingPipeline, SystemClock};
pub use crate::store::ArticleStore;
