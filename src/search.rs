//! News lookups used to ground the research step in recent coverage.

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DUCKDUCKGO_BASE_URL: &str = "https://duckduckgo.com";

// worldwide results
const REGION: &str = "wt-wt";

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search response was not valid json: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("search returned status {0}")]
    Status(u16),
    #[error("search token not found for query {0:?}")]
    TokenNotFound(String),
    #[error("no results found for {0:?}; try modifying your search query")]
    NoResults(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub summary: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait NewsSearch: Send + Sync {
    async fn news(&self, query: &str, max_results: usize) -> Result<Vec<Headline>, SearchError>;

    fn name(&self) -> &'static str;
}

/// Numbered plain-text listing of headlines, suitable for a prompt.
pub fn format_headlines(headlines: &[Headline]) -> String {
    headlines
        .iter()
        .enumerate()
        .map(|(index, headline)| {
            let date = headline
                .date
                .map(|date| date.format("%Y-%m-%d %H:%M UTC").to_string());
            format!(
                "{}. Title: {}\n   Date: {}\n   Source: {}\n   Summary: {}\n   URL: {}\n",
                index + 1,
                headline.title.as_deref().unwrap_or("No title available"),
                date.as_deref().unwrap_or("Date not available"),
                headline.source.as_deref().unwrap_or("Unknown source"),
                headline.summary.as_deref().unwrap_or("No description available"),
                headline.url.as_deref().unwrap_or("No link available"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
pub struct DuckDuckGo {
    client: Client,
    base_url: String,
}

impl DuckDuckGo {
    pub fn new() -> Result<Self, SearchError> {
        Self::with_base_url(DUCKDUCKGO_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SearchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn token(&self, query: &str) -> Result<String, SearchError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        RE_VQD
            .captures(&body)
            .and_then(|caps| caps.get(1))
            .map(|token| token.as_str().to_string())
            .ok_or_else(|| SearchError::TokenNotFound(query.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    #[serde(default)]
    date: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<NewsResult> for Headline {
    fn from(result: NewsResult) -> Self {
        Headline {
            title: result.title.map(|title| normalize(&title)).filter(|t| !t.is_empty()),
            date: result
                .date
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            source: result.source.filter(|s| !s.is_empty()),
            summary: result
                .excerpt
                .map(|excerpt| normalize(&excerpt))
                .filter(|s| !s.is_empty()),
            url: result.url.filter(|u| !u.is_empty()),
        }
    }
}

#[async_trait]
impl NewsSearch for DuckDuckGo {
    async fn news(&self, query: &str, max_results: usize) -> Result<Vec<Headline>, SearchError> {
        let vqd = self.token(query).await?;

        tracing::debug!(query, max_results, "fetching news results");

        let response = self
            .client
            .get(format!("{}/news.js", self.base_url))
            .query(&[
                ("l", REGION),
                ("o", "json"),
                ("noamp", "1"),
                ("q", query),
                ("vqd", vqd.as_str()),
                // safe search on
                ("p", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let text = response.text().await?;
        let parsed: NewsResponse = serde_json::from_str(&text)?;

        let mut seen = HashSet::new();
        let headlines: Vec<Headline> = parsed
            .results
            .into_iter()
            .filter(|result| match &result.url {
                Some(url) => seen.insert(url.clone()),
                None => true,
            })
            .take(max_results)
            .map(Headline::from)
            .collect();

        if headlines.is_empty() {
            return Err(SearchError::NoResults(query.to_string()));
        }

        Ok(headlines)
    }

    fn name(&self) -> &'static str {
        "duckduckgo"
    }
}

static RE_VQD: Lazy<Regex> = Lazy::new(|| Regex::new(r#"vqd=["']?([\w-]+)"#).unwrap());
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

fn normalize(raw: &str) -> String {
    let stripped = RE_TAGS.replace_all(raw, "");
    html_escape::decode_html_entities(&stripped).trim().to_string()
}
