//! Turns a ranked candidate into short publishable text. The LLM is a
//! black box: empty output and errors are treated identically, and the
//! caller always has the raw title to fall back on, so enrichment
//! failure never blocks posting.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::article::Article;
use crate::config::NewsConfig;

pub const POST_CHAR_LIMIT: usize = 280;

#[async_trait]
pub trait Composer: Send + Sync {
    /// One engaging sentence for the given article, or empty/Err when
    /// unavailable.
    async fn summarize(&self, title: &str, summary: &str, source: &str) -> Result<String>;
}

/// No-op composer: always yields empty output, so every post falls back
/// to the raw title. Used when no LLM credentials are configured.
pub struct DisabledComposer;

#[async_trait]
impl Composer for DisabledComposer {
    async fn summarize(&self, _title: &str, _summary: &str, _source: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// OpenAI-compatible chat-completions client. The base URL is
/// configurable so Fireworks-style endpoints work unchanged.
pub struct LlmComposer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmComposer {
    pub fn new(base_url: String, api_key: String, model: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("news-autoposter/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .context("building composer http client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
            model,
        })
    }

    /// Build from `LLM_API_KEY` / `LLM_BASE_URL` / `LLM_MODEL`.
    /// Returns `None` when no key is configured.
    pub fn from_env() -> Result<Option<Self>> {
        let api_key = std::env::var("LLM_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Ok(None);
        }
        let base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Ok(Some(Self::new(base_url, api_key, model)?))
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

#[async_trait]
impl Composer for LlmComposer {
    async fn summarize(&self, title: &str, summary: &str, source: &str) -> Result<String> {
        let prompt = format!(
            "You are a news assistant for a social feed. \
             Write one engaging sentence under 240 characters (no hashtags, no emojis). \
             Be factual, neutral about the publisher, and highlight the impact.\n\
             Title: {title}\nSource: {source}\nSummary: {summary}\n\
             Return only the sentence."
        );
        let req = ChatReq {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.5,
            max_tokens: 120,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("composer request failed")?;
        let resp = resp.error_for_status().context("composer non-success status")?;
        let body: ChatResp = resp.json().await.context("composer response body")?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        Ok(single_line(content))
    }
}

/// Collapse to one line; the composed post carries the link on the same
/// line and newlines read badly on most platforms.
fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Assemble the final post text: composer sentence (title on fallback),
/// optional category hashtag, then the link, truncated to the platform
/// character limit.
pub async fn compose_post(composer: &dyn Composer, article: &Article, cfg: &NewsConfig) -> String {
    let base = match composer
        .summarize(&article.title, &article.summary, &article.source)
        .await
    {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => article.title.clone(),
        Err(e) => {
            tracing::warn!(error = ?e, "composer failed, falling back to title");
            article.title.clone()
        }
    };

    let tags = if cfg.hashtags {
        category_hashtag(&article.category)
    } else {
        ""
    };

    let text = format!("{base}{tags} {}", article.link.trim());
    truncate_chars(text.trim(), POST_CHAR_LIMIT)
}

fn category_hashtag(category: &str) -> &'static str {
    match category {
        "ai" => " #AI",
        "tech" => " #tech",
        "crypto" => " #crypto",
        "finance" => " #finance",
        _ => "",
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::Utc;

    struct FixedComposer(&'static str);

    #[async_trait]
    impl Composer for FixedComposer {
        async fn summarize(&self, _t: &str, _s: &str, _src: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingComposer;

    #[async_trait]
    impl Composer for FailingComposer {
        async fn summarize(&self, _t: &str, _s: &str, _src: &str) -> Result<String> {
            Err(anyhow!("timeout"))
        }
    }

    fn article(category: &str) -> Article {
        Article::new(
            "id-1".into(),
            "Original headline".into(),
            "some summary".into(),
            "https://example.com/x".into(),
            "Wired".into(),
            category.into(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn uses_composer_sentence_with_hashtag_and_link() {
        let cfg = NewsConfig::default();
        let text = compose_post(&FixedComposer("Big news happened."), &article("tech"), &cfg).await;
        assert_eq!(text, "Big news happened. #tech https://example.com/x");
    }

    #[tokio::test]
    async fn empty_and_error_both_fall_back_to_title() {
        let cfg = NewsConfig::default();
        let from_empty = compose_post(&FixedComposer("   "), &article("crypto"), &cfg).await;
        let from_error = compose_post(&FailingComposer, &article("crypto"), &cfg).await;
        assert_eq!(from_empty, "Original headline #crypto https://example.com/x");
        assert_eq!(from_empty, from_error);
    }

    #[tokio::test]
    async fn hashtags_can_be_disabled_and_unknown_category_has_none() {
        let cfg = NewsConfig {
            hashtags: false,
            ..NewsConfig::default()
        };
        let text = compose_post(&FixedComposer("S."), &article("tech"), &cfg).await;
        assert_eq!(text, "S. https://example.com/x");

        let cfg = NewsConfig::default();
        let text = compose_post(&FixedComposer("S."), &article("general"), &cfg).await;
        assert_eq!(text, "S. https://example.com/x");
    }

    #[tokio::test]
    async fn output_is_truncated_to_char_limit() {
        let cfg = NewsConfig::default();
        let long = "x".repeat(400);
        let long: &'static str = Box::leak(long.into_boxed_str());
        let text = compose_post(&FixedComposer(long), &article("tech"), &cfg).await;
        assert_eq!(text.chars().count(), POST_CHAR_LIMIT);
    }

    #[test]
    fn single_line_collapses_newlines() {
        assert_eq!(single_line("a\nb\n\n  c"), "a b c");
    }
}
