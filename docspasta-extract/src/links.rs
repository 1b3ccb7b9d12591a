//! Link extraction from raw HTML.
//!
//! Grounded on the regex-over-raw-HTML approach used elsewhere in this
//! codebase's corpus for the same problem: `href=` is the only semantic
//! "link" attribute worth walking, so a full DOM parse is unnecessary
//! overhead here (the markdown conversion path in `markdown.rs` already
//! does a real parse for content extraction). `src`, `data-*`, inline JS,
//! and plain-text URLs are deliberately ignored.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

/// Extract all `href` targets from raw HTML, resolved against `base_url`,
/// deduplicated, in first-seen order. Malformed hrefs and a malformed
/// `base_url` are both silently skipped rather than causing a panic.
pub fn extract_all_links(html: &str, base_url: &str) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for cap in HREF_RE.captures_iter(html) {
        let raw = &cap[1];
        if let Some(resolved) = resolve_href(raw, base.as_ref()) {
            if seen.insert(resolved.clone()) {
                links.push(resolved);
            }
        }
    }

    links
}

fn resolve_href(raw: &str, base: Option<&Url>) -> Option<String> {
    let parsed = if raw.starts_with("http://") || raw.starts_with("https://") {
        Url::parse(raw).ok()?
    } else {
        base?.join(raw).ok()?
    };
    Some(parsed.to_string())
}
