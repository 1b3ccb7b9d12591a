//! URL normalization, fingerprinting, and scope admission (SPEC_FULL.md §4.1).
//!
//! Pure functions, no I/O — kept exhaustively unit-testable the same way
//! the teacher's link-extraction module is: one `#[test]` per rule, grouped
//! under a named comment band.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "ref", "redirect", "mc_cid", "mc_eid", "_hsenc", "_hsmi", "igshid",
];

const SKIP_ASSET_PREFIXES: &[&str] = &[
    "/assets/", "/images/", "/img/", "/css/", "/js/", "/fonts/", "/static/", "/media/",
];

const BLOCKED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "css", "js", "woff", "woff2", "ttf", "eot",
    "mp4", "mp3", "pdf", "zip", "tar", "gz", "exe", "dmg",
];

const MAX_PATH_LEN: usize = 300;

static UTM_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^utm_").expect("valid regex"));

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("could not parse url: {0}")]
    Parse(String),
    #[error("unsupported scheme")]
    UnsupportedScheme,
    #[error("pure intra-page anchor")]
    PureAnchor,
}

/// Normalize a (possibly relative) link against its parent page URL.
///
/// Order: resolve relative to parent → lowercase hostname → strip default
/// port → collapse duplicate slashes → strip fragment (discarding pure
/// intra-page anchors entirely) → strip trailing slash unless root → strip
/// tracking params → sort remaining query keys.
pub fn normalize(raw: &str, parent: Option<&Url>) -> Result<Url, NormalizeError> {
    normalize_inner(raw, parent, true)
}

fn normalize_inner(raw: &str, parent: Option<&Url>, strip_trailing_slash: bool) -> Result<Url, NormalizeError> {
    let resolved = if let Some(parent) = parent {
        parent
            .join(raw)
            .map_err(|e| NormalizeError::Parse(e.to_string()))?
    } else {
        Url::parse(raw).map_err(|e| NormalizeError::Parse(e.to_string()))?
    };

    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return Err(NormalizeError::UnsupportedScheme);
    }

    // A pure intra-page anchor: same path/query as the parent, only the
    // fragment differs. Discarded entirely rather than admitted as a link.
    if let Some(parent) = parent {
        let same_doc = resolved.scheme() == parent.scheme()
            && resolved.host_str() == parent.host_str()
            && resolved.path() == parent.path()
            && resolved.query() == parent.query();
        if same_doc && resolved.fragment().is_some() {
            return Err(NormalizeError::PureAnchor);
        }
    }

    let mut out = resolved.clone();
    out.set_fragment(None);

    if let Some(host) = out.host_str() {
        let lowered = host.to_lowercase();
        let _ = out.set_host(Some(&lowered));
    }

    // Strip default ports (url already omits them for http/https on
    // serialization, but an explicit `:443`/`:80` survives parsing, so
    // clear it out).
    let default_port = match out.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if out.port() == default_port {
        let _ = out.set_port(None);
    }

    let collapsed = collapse_slashes(out.path());
    out.set_path(&collapsed);

    if strip_trailing_slash && out.path().len() > 1 && out.path().ends_with('/') {
        let trimmed = out.path().trim_end_matches('/').to_string();
        out.set_path(&trimmed);
    }

    strip_tracking_and_sort_query(&mut out);

    Ok(out)
}

fn collapse_slashes(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        result.push(c);
    }
    if result.is_empty() {
        "/".to_string()
    } else {
        result
    }
}

fn strip_tracking_and_sort_query(url: &mut Url) {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
        return;
    }

    let mut sorted = pairs;
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut qs = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &sorted {
        qs.append_pair(k, v);
    }
    url.set_query(Some(&qs.finish()));
}

fn is_tracking_param(key: &str) -> bool {
    UTM_PREFIX.is_match(key) || TRACKING_PARAMS.contains(&key)
}

/// Deterministic fingerprint of the canonical URL form: SHA-256, hex,
/// truncated to 32 chars. The normalization procedure, not the hash
/// algorithm, is what determines dedup semantics.
pub fn fingerprint(canonical: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_str().as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..32].to_string()
}

/// Scope/admission rules for a *discovered link* (not the seed — seeds are
/// always admitted regardless of the bare-origin rule below). `seed_path_prefix`
/// must come from [`seed_path_prefix`], not be re-derived from `seed.path()`
/// here — `seed` has already been through `normalize`'s unconditional
/// trailing-slash strip, which erases the directory-vs-file distinction
/// that the prefix depends on.
pub fn is_admissible(url: &Url, seed: &Url, seed_path_prefix: &str, follow_external_links: bool) -> bool {
    if url.scheme() != "http" && url.scheme() != "https" {
        return false;
    }

    if !follow_external_links {
        let in_scope = url.host_str() == seed.host_str() && url.path().starts_with(seed_path_prefix);
        if !in_scope {
            return false;
        }
    }

    let path = url.path();

    if SKIP_ASSET_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return false;
    }

    if let Some(ext) = path.rsplit('.').next() {
        if path.contains('.') && BLOCKED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            return false;
        }
    }

    if path.len() > MAX_PATH_LEN {
        return false;
    }

    if path == "/" {
        return false;
    }

    true
}

/// The path prefix a seed confines discovered links to when
/// `follow_external_links` is false: the seed's own directory if its path
/// ends in `/` (a directory-index seed is its own scope root), otherwise its
/// parent directory. Computed from the *raw* seed URL, before `normalize`
/// would strip that trailing slash and silently widen the scope to the
/// seed's parent instead of the seed itself.
pub fn seed_path_prefix(seed_url: &str) -> Result<String, NormalizeError> {
    let parsed = normalize_inner(seed_url, None, false)?;
    let path = parsed.path();
    if path == "/" || path.is_empty() {
        return Ok("/".to_string());
    }
    if path.ends_with('/') {
        return Ok(path.to_string());
    }
    match path.rfind('/') {
        Some(idx) => Ok(path[..=idx].to_string()),
        None => Ok("/".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(raw: &str) -> Url {
        normalize(raw, None).expect("should normalize")
    }

    // --- hostname / port / slashes ---

    #[test]
    fn lowercases_hostname() {
        assert_eq!(n("https://EXAMPLE.com/path").host_str(), Some("example.com"));
    }

    #[test]
    fn strips_default_https_port() {
        assert_eq!(n("https://example.com:443/path").as_str(), "https://example.com/path");
    }

    #[test]
    fn strips_default_http_port() {
        assert_eq!(n("http://example.com:80/path").as_str(), "http://example.com/path");
    }

    #[test]
    fn keeps_nondefault_port() {
        assert_eq!(n("https://example.com:8443/path").port(), Some(8443));
    }

    #[test]
    fn collapses_duplicate_slashes() {
        assert_eq!(n("https://example.com/a//b///c").path(), "/a/b/c");
    }

    #[test]
    fn strips_trailing_slash_unless_root() {
        assert_eq!(n("https://example.com/docs/").path(), "/docs");
        assert_eq!(n("https://example.com/").path(), "/");
    }

    // --- fragments ---

    #[test]
    fn strips_fragment_from_different_path() {
        assert_eq!(n("https://example.com/a#b").fragment(), None);
    }

    #[test]
    fn pure_intra_page_anchor_is_rejected() {
        let parent = Url::parse("https://example.com/docs/page").unwrap();
        let err = normalize("#section", Some(&parent)).unwrap_err();
        assert_eq!(err, NormalizeError::PureAnchor);
    }

    #[test]
    fn anchor_on_different_page_is_admitted() {
        let parent = Url::parse("https://example.com/docs/page").unwrap();
        let out = normalize("/docs/other#section", Some(&parent)).unwrap();
        assert_eq!(out.path(), "/docs/other");
        assert_eq!(out.fragment(), None);
    }

    // --- tracking params ---

    #[test]
    fn strips_utm_params() {
        let out = n("https://example.com/a?utm_source=x&utm_campaign=y&keep=1");
        assert_eq!(out.query(), Some("keep=1"));
    }

    #[test]
    fn strips_named_tracking_params() {
        let out = n("https://example.com/a?fbclid=1&gclid=2&ref=3&redirect=4&id=5");
        assert_eq!(out.query(), Some("id=5"));
    }

    #[test]
    fn sorts_remaining_query_keys() {
        let out = n("https://example.com/a?z=1&a=2&m=3");
        assert_eq!(out.query(), Some("a=2&m=3&z=1"));
    }

    #[test]
    fn no_query_after_stripping_all_tracking_params() {
        let out = n("https://example.com/a?utm_source=x");
        assert_eq!(out.query(), None);
    }

    // --- scheme ---

    #[test]
    fn rejects_unsupported_scheme() {
        let err = normalize("mailto:a@example.com", None).unwrap_err();
        assert_eq!(err, NormalizeError::UnsupportedScheme);
    }

    // --- idempotence / round-trip law ---

    #[test]
    fn normalize_is_idempotent() {
        let once = n("https://EXAMPLE.com:443//docs//page/?utm_source=x&b=1&a=2#frag");
        let twice = normalize(once.as_str(), None).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn fingerprint_matches_iff_normalized_forms_match() {
        let a = n("https://EXAMPLE.com/docs/page/?utm_source=x");
        let b = n("https://example.com/docs/page?b=2");
        assert_ne!(fingerprint(&a), fingerprint(&b));

        let c = n("https://EXAMPLE.com:443/docs/page?utm_campaign=y");
        let d = n("https://example.com/docs/page");
        assert_eq!(fingerprint(&c), fingerprint(&d));
    }

    // --- admission / scope rules ---

    /// Test helper mirroring the production call site (`crawler.rs`'s
    /// `run_batch`): the seed `Url` used for host comparison comes from
    /// `normalize`, but the scope prefix must come from `seed_path_prefix`
    /// applied to the *raw* seed string, not from `seed.path()`.
    fn seed_and_prefix(raw: &str) -> (Url, String) {
        (n(raw), seed_path_prefix(raw).unwrap())
    }

    #[test]
    fn rejects_bare_origin_for_links() {
        let (seed, prefix) = seed_and_prefix("https://example.com/docs/");
        let bare = Url::parse("https://example.com/").unwrap();
        assert!(!is_admissible(&bare, &seed, &prefix, false));
    }

    #[test]
    fn rejects_skip_asset_prefixes() {
        let (seed, prefix) = seed_and_prefix("https://example.com/");
        let asset = Url::parse("https://example.com/static/app.css").unwrap();
        assert!(!is_admissible(&asset, &seed, &prefix, false));
    }

    #[test]
    fn rejects_blocked_extensions() {
        let (seed, prefix) = seed_and_prefix("https://example.com/");
        let img = Url::parse("https://example.com/photo.png").unwrap();
        assert!(!is_admissible(&img, &seed, &prefix, false));
    }

    #[test]
    fn rejects_path_over_max_length() {
        let (seed, prefix) = seed_and_prefix("https://example.com/");
        let long_path = format!("https://example.com/{}", "a".repeat(400));
        let url = Url::parse(&long_path).unwrap();
        assert!(!is_admissible(&url, &seed, &prefix, false));
    }

    #[test]
    fn rejects_external_host_when_not_following_external() {
        let (seed, prefix) = seed_and_prefix("https://docs.example.com/");
        let external = Url::parse("https://other.com/page").unwrap();
        assert!(!is_admissible(&external, &seed, &prefix, false));
    }

    #[test]
    fn admits_external_host_when_following_external() {
        let (seed, prefix) = seed_and_prefix("https://docs.example.com/");
        let external = Url::parse("https://other.com/page").unwrap();
        assert!(is_admissible(&external, &seed, &prefix, true));
    }

    #[test]
    fn admits_in_scope_doc_page() {
        let (seed, prefix) = seed_and_prefix("https://docs.example.com/guide/");
        let page = Url::parse("https://docs.example.com/guide/intro").unwrap();
        assert!(is_admissible(&page, &seed, &prefix, false));
    }

    #[test]
    fn rejects_out_of_path_prefix_scope() {
        let (seed, prefix) = seed_and_prefix("https://example.com/docs/");
        let outside = Url::parse("https://example.com/blog/post").unwrap();
        assert!(!is_admissible(&outside, &seed, &prefix, false));
    }

    #[test]
    fn trailing_slash_seed_confines_scope_to_its_own_directory_not_the_host() {
        // The bug this guards: `normalize()` strips a seed's trailing slash
        // for its canonical form, so deriving the scope prefix from the
        // normalized seed's path (`/guide`) instead of the raw seed string
        // (`/guide/`) would find only the leading `/` and admit the whole
        // host. `seed_path_prefix` must be computed from the raw string.
        let (seed, prefix) = seed_and_prefix("https://docs.example.com/guide/");
        assert_eq!(prefix, "/guide/");

        let sibling_dir = Url::parse("https://docs.example.com/other/page").unwrap();
        assert!(!is_admissible(&sibling_dir, &seed, &prefix, false));

        let inside = Url::parse("https://docs.example.com/guide/intro").unwrap();
        assert!(is_admissible(&inside, &seed, &prefix, false));
    }

    #[test]
    fn seed_without_trailing_slash_scopes_to_its_parent_directory() {
        let (seed, prefix) = seed_and_prefix("https://docs.example.com/guide");
        assert_eq!(prefix, "/");

        let sibling = Url::parse("https://docs.example.com/other").unwrap();
        assert!(is_admissible(&sibling, &seed, &prefix, false));
    }
}
