use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ExtractError, Result};
use crate::{links, markdown};

/// Result of fetching + extracting a single URL. `None` fields indicate a
/// non-2xx (other than 304) response, or no markdown survived extraction.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub http_status: u16,
    pub title: Option<String>,
    pub markdown: Option<String>,
    pub raw_body_len: usize,
    pub extracted_links: Vec<String>,
}

/// Trait boundary the crawl worker depends on instead of the concrete
/// `Extractor`, so tests can substitute a fixed URL→response fake without
/// making real network calls (mirrors the teacher's `PageScraper` trait in
/// `rootsignal-scout/src/pipeline/scraper.rs`).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_and_extract(&self, url: &str, timeout: Duration) -> Result<ExtractedPage>;
}

/// Fetches a URL and extracts content per SPEC_FULL.md §4.2. One instance
/// is shared across all workers for a process (holds a pooled `reqwest`
/// client); timeout is per-call so each job's configured
/// `per_page_timeout_secs` can differ.
pub struct Extractor {
    client: reqwest::Client,
    user_agent: String,
}

impl Extractor {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl PageFetcher for Extractor {
    async fn fetch_and_extract(&self, url: &str, timeout: Duration) -> Result<ExtractedPage> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        let status = response.status().as_u16();
        let ok = response.status().is_success() || status == 304;

        if !ok {
            return Ok(ExtractedPage {
                http_status: status,
                title: None,
                markdown: None,
                raw_body_len: 0,
                extracted_links: Vec::new(),
            });
        }

        let body = response.text().await?;
        let title = markdown::extract_title(&body);
        let md = markdown::html_to_markdown(&body, Some(url));
        let extracted_links = links::extract_all_links(&body, url);

        Ok(ExtractedPage {
            http_status: status,
            title,
            markdown: if md.trim().is_empty() { None } else { Some(md) },
            raw_body_len: body.len(),
            extracted_links,
        })
    }
}

impl From<url::ParseError> for ExtractError {
    fn from(e: url::ParseError) -> Self {
        ExtractError::InvalidUrl(e.to_string())
    }
}
