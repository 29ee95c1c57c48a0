//! Posting capability. The platform transport is reduced to one call:
//! `post(text) -> PostOutcome`. Rate limiting is structured data, not an
//! error; it drives early cycle termination upstream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Outcome of one post attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// Accepted; platform-assigned identifier.
    Posted(String),
    /// Caller must stop posting this cycle; optional suggested wait.
    RateLimited(Option<u64>),
    /// Non-retryable failure for this item.
    Failed(String),
}

#[async_trait]
pub trait Poster: Send + Sync {
    async fn post(&self, text: &str) -> PostOutcome;
}

/// Bearer-token JSON poster. The HTTP client is built on the first
/// actual post attempt, so constructing the poster (and running dry
/// cycles or tests) never touches the network.
pub struct HttpPoster {
    endpoint: String,
    token: String,
    timeout: Duration,
    client: OnceCell<reqwest::Client>,
}

impl HttpPoster {
    pub fn new(endpoint: String, token: String) -> Self {
        Self {
            endpoint,
            token,
            timeout: Duration::from_secs(10),
            client: OnceCell::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Build from `POSTER_API_URL` / `POSTER_API_TOKEN`. Errors when
    /// either is missing: posting credentials are mandatory unless the
    /// bot runs in dry-run mode, and that check belongs to startup.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("POSTER_API_URL").context("POSTER_API_URL is not set")?;
        let token = std::env::var("POSTER_API_TOKEN").context("POSTER_API_TOKEN is not set")?;
        if endpoint.trim().is_empty() || token.trim().is_empty() {
            anyhow::bail!("posting credentials are empty");
        }
        Ok(Self::new(endpoint, token))
    }

    async fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .user_agent("news-autoposter/0.1")
                    .connect_timeout(Duration::from_secs(4))
                    .timeout(self.timeout)
                    .build()
                    .context("building poster http client")
            })
            .await
    }
}

#[derive(Serialize)]
struct PostBody<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct PostResp {
    #[serde(default)]
    data: Option<PostData>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
}

/// Best-effort retry hint from 429 responses: `Retry-After` seconds, or
/// `x-rate-limit-reset` as a unix timestamp.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get(reqwest::header::RETRY_AFTER) {
        if let Some(secs) = v.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok()) {
            return Some(secs);
        }
    }
    if let Some(v) = headers.get("x-rate-limit-reset") {
        if let Some(reset_at) = v.to_str().ok().and_then(|s| s.trim().parse::<i64>().ok()) {
            let now = chrono::Utc::now().timestamp();
            return Some(reset_at.saturating_sub(now).max(0) as u64);
        }
    }
    None
}

#[async_trait]
impl Poster for HttpPoster {
    async fn post(&self, text: &str) -> PostOutcome {
        let client = match self.client().await {
            Ok(c) => c,
            Err(e) => return PostOutcome::Failed(format!("client init: {e}")),
        };

        let resp = client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&PostBody { text })
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return PostOutcome::Failed(format!("request: {e}")),
        };

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return PostOutcome::RateLimited(retry_after_secs(resp.headers()));
        }
        if !resp.status().is_success() {
            return PostOutcome::Failed(format!("status {}", resp.status()));
        }

        // Id location varies between platforms; accept the common shapes
        // and fall back to an empty id rather than failing a post that
        // the platform accepted.
        let id = match resp.json::<PostResp>().await {
            Ok(body) => body.data.map(|d| d.id).or(body.id).unwrap_or_default(),
            Err(_) => String::new(),
        };
        PostOutcome::Posted(id)
    }
}
