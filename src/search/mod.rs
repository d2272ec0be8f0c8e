//! Web search collaborator — Google Custom Search plus page-text
//! extraction for the search-augmentation flow.

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::LazyLock;

use crate::error::UpstreamError;

/// Minimum words a scraped page must contain to be usable as context.
const MIN_SCRAPE_WORDS: usize = 50;

/// External search collaborator: given a query, returns URLs; given a URL,
/// returns extracted page text.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, num_links: u32) -> Result<Vec<String>, UpstreamError>;

    async fn fetch_page_text(&self, url: &str) -> Result<String, UpstreamError>;

    /// Fetch each URL, returning one text per URL in order. Unreachable
    /// pages and pages with too little text yield an empty slot so callers
    /// can keep URLs and texts aligned.
    async fn scrape(&self, urls: &[String]) -> Vec<String> {
        let mut texts = Vec::with_capacity(urls.len());
        for url in urls {
            match self.fetch_page_text(url).await {
                Ok(text) if text.split_whitespace().count() >= MIN_SCRAPE_WORDS => {
                    texts.push(text);
                }
                Ok(_) => texts.push(String::new()),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "page fetch failed, skipping");
                    texts.push(String::new());
                }
            }
        }
        texts
    }
}

/// Google Custom Search JSON API client.
pub struct GoogleSearchClient {
    http: reqwest::Client,
    api_key: SecretString,
    cse_id: String,
}

impl GoogleSearchClient {
    pub fn new(http: reqwest::Client, api_key: SecretString, cse_id: String) -> Self {
        Self {
            http,
            api_key,
            cse_id,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
}

#[async_trait]
impl WebSearch for GoogleSearchClient {
    async fn search(&self, query: &str, num_links: u32) -> Result<Vec<String>, UpstreamError> {
        let resp = self
            .http
            .get("https://www.googleapis.com/customsearch/v1")
            .query(&[
                ("key", self.api_key.expose_secret()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", &num_links.to_string()),
                ("excludeTerms", "youtube.com"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Search(format!(
                "custom search returned {status}: {body}"
            )));
        }

        let parsed: SearchResponse = resp.json().await?;
        Ok(parsed.items.into_iter().map(|i| i.link).collect())
    }

    async fn fetch_page_text(&self, url: &str) -> Result<String, UpstreamError> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(UpstreamError::Search(format!(
                "page fetch returned {}",
                resp.status()
            )));
        }
        let html = resp.text().await?;
        Ok(html_to_text(&html))
    }
}

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>")
        .expect("script regex should compile")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex should compile"));

/// Strip tags and collapse whitespace to a single-line text body.
pub fn html_to_text(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let without_tags = TAG_RE.replace_all(&without_scripts, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}
