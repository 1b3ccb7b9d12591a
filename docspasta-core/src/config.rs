use serde::{Deserialize, Serialize};

/// Per-job crawl configuration. Defaults match SPEC_FULL.md §4.9; every
/// field is independently overridable in the `POST /crawl` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_depth: i32,
    pub max_pages: u32,
    pub quality_threshold: i32,
    pub concurrency: usize,
    pub per_page_timeout_secs: u64,
    pub respect_robots_txt: bool,
    pub delay_ms: u64,
    pub follow_external_links: bool,
    pub initial_workers: usize,
    pub max_workers_per_job: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_pages: 50,
            quality_threshold: 20,
            concurrency: 3,
            per_page_timeout_secs: 8,
            respect_robots_txt: true,
            delay_ms: 0,
            follow_external_links: false,
            initial_workers: 3,
            max_workers_per_job: 5,
        }
    }
}
