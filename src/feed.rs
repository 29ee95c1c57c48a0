//! Feed source boundary: given a URL and a cap, return normalized
//! entries. RSS parsing failures never propagate past this module's
//! `Result`; the aggregator decides what a failed feed costs (nothing).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

/// One raw entry as surfaced by a feed, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    /// Channel-level title, used to resolve the publisher name.
    pub feed_title: Option<String>,
}

/// Capability the aggregator consumes: fetch up to `limit` entries from
/// one feed URL.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str, limit: usize) -> Result<Vec<FeedEntry>>;
}

// --- RSS 2.0 wire shapes ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    guid: Option<String>,
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822_utc(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Production feed source: HTTP GET + RSS 2.0 deserialization.
/// `from_fixture` feeds the same parser from a string, for tests.
pub struct RssFeedSource {
    mode: Mode,
}

enum Mode {
    Http { client: reqwest::Client },
    Fixture(String),
}

impl RssFeedSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("news-autoposter/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self {
            mode: Mode::Http { client },
        })
    }

    /// Parse the given XML body regardless of URL. Test-only entry point
    /// in spirit, but not feature-gated: fixtures are how integration
    /// tests drive the whole pipeline offline.
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_body(body: &str, limit: usize) -> Result<Vec<FeedEntry>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(body);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let feed_title = rss.channel.title.map(|t| t.trim().to_string());
        let mut out = Vec::with_capacity(rss.channel.item.len().min(limit));
        for it in rss.channel.item.into_iter().take(limit) {
            out.push(FeedEntry {
                guid: none_if_blank(it.guid),
                title: none_if_blank(it.title).map(decode_entities),
                link: none_if_blank(it.link),
                summary: none_if_blank(it.description).map(decode_entities),
                published: it.pub_date.as_deref().and_then(parse_rfc2822_utc),
                feed_title: feed_title.clone(),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("feed_parse_ms").record(ms);
        counter!("feed_entries_total").increment(out.len() as u64);
        Ok(out)
    }
}

fn none_if_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Publishers double-escape: the XML layer yields `&hellip;`-style HTML
/// entities inside titles and summaries.
fn decode_entities(s: String) -> String {
    html_escape::decode_html_entities(&s).into_owned()
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch(&self, url: &str, limit: usize) -> Result<Vec<FeedEntry>> {
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_body(xml, limit),
            Mode::Http { client } => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("fetching feed {url}"))?;
                let body = resp
                    .error_for_status()
                    .with_context(|| format!("feed {url} returned error status"))?
                    .text()
                    .await
                    .context("reading feed body")?;
                Self::parse_body(&body, limit)
            }
        }
    }
}

/// Feeds in the wild embed HTML entities that are not valid XML;
/// replace the common ones before handing the body to the parser.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
