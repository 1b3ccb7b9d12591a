//! HTML → Markdown conversion (SPEC_FULL.md §4.2).
//!
//! Main-content location is the ordered CSS-selector try-list spec.md §4.2
//! mandates, walked by hand with `scraper` the same way the teacher's own
//! `rootsignal-domains/src/scraping/link_extractor.rs` walks anchors with it
//! — `spider_transformations`'s `readability: true` heuristic scores a page
//! by structure rather than trying selectors in a fixed priority order, so
//! it isn't a substitute for this step. Once the main-content fragment (or
//! the whole document, on fallback) is picked, `transform_content_input`
//! still does the HTML→Markdown rendering itself.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

/// spec.md §4.2's main-content selectors, tried in this exact order; the
/// first one that matches anything wins.
const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=main]",
    ".main-content",
    ".content",
    ".article",
    ".documentation",
    ".docs-content",
    "#main-content",
    "#content",
];

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|noscript)\b[^>]*>.*?</\1>").expect("valid regex")
});

static ARIA_HIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<([a-z0-9]+)\b[^>]*\baria-hidden\s*=\s*["']true["'][^>]*>.*?</\1>"#)
        .expect("valid regex")
});

static HIDDEN_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<([a-z0-9]+)\b[^>]*\bclass\s*=\s*["'][^"']*\b(hidden|display-none)\b[^"']*["'][^>]*>.*?</\1>"#,
    )
    .expect("valid regex")
});

/// Extract the `<title>` text, if present.
pub fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Strip non-content chrome elements before conversion, per SPEC_FULL.md
/// §4.2: `script, style, iframe, noscript, [aria-hidden=true], .hidden,
/// .display-none`.
fn strip_chrome(html: &str) -> String {
    let step1 = SCRIPT_STYLE_RE.replace_all(html, "");
    let step2 = ARIA_HIDDEN_RE.replace_all(&step1, "");
    HIDDEN_CLASS_RE.replace_all(&step2, "").into_owned()
}

/// Try spec.md §4.2's main-content selectors in order; the outer HTML of the
/// first match wins. Falls back to `<body>`, and to the document itself if
/// even that is missing (a fragment with no `<html>`/`<body>` wrapper).
fn locate_main_content(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector_str in MAIN_CONTENT_SELECTORS {
        let selector = Selector::parse(selector_str).expect("hardcoded selector is valid");
        if let Some(element) = document.select(&selector).next() {
            return element.html();
        }
    }

    let body_selector = Selector::parse("body").expect("hardcoded selector is valid");
    match document.select(&body_selector).next() {
        Some(body) => body.html(),
        None => html.to_string(),
    }
}

/// Convert raw HTML into clean Markdown. ATX headings, fenced code, `-`
/// bullets, `_` emphasis, `**` strong, `---` rule are whatever the
/// underlying transform emits — its markdown writer already follows those
/// conventions; main-content location happens explicitly before that, via
/// [`locate_main_content`], so `readability`/`main_content` are off here.
pub fn html_to_markdown(html: &str, url: Option<&str>) -> String {
    let cleaned = strip_chrome(html);
    let main_content = locate_main_content(&cleaned);
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());

    let config = TransformConfig {
        readability: false,
        main_content: false,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };

    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: main_content.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title() {
        let html = "<html><head><title>Getting Started</title></head><body></body></html>";
        assert_eq!(extract_title(html), Some("Getting Started".to_string()));
    }

    #[test]
    fn missing_title_returns_none() {
        assert_eq!(extract_title("<html><body></body></html>"), None);
    }

    #[test]
    fn strips_script_and_style() {
        let html = r#"<div><script>evil()</script><style>.x{}</style><p>content</p></div>"#;
        let cleaned = strip_chrome(html);
        assert!(!cleaned.contains("evil()"));
        assert!(!cleaned.contains(".x{}"));
        assert!(cleaned.contains("content"));
    }

    #[test]
    fn strips_aria_hidden_elements() {
        let html = r#"<div aria-hidden="true"><span>ignore me</span></div><p>keep me</p>"#;
        let cleaned = strip_chrome(html);
        assert!(!cleaned.contains("ignore me"));
        assert!(cleaned.contains("keep me"));
    }

    #[test]
    fn strips_hidden_class_elements() {
        let html = r#"<div class="sidebar hidden">drop</div><div class="content">keep</div>"#;
        let cleaned = strip_chrome(html);
        assert!(!cleaned.contains("drop"));
        assert!(cleaned.contains("keep"));
    }

    #[test]
    fn main_tag_wins_over_later_selectors_in_the_try_list() {
        let html = r#"
            <body>
                <div class="content">wrong: generic content div</div>
                <main>right: the main element</main>
            </body>
        "#;
        let located = locate_main_content(html);
        assert!(located.contains("right: the main element"));
        assert!(!located.contains("wrong"));
    }

    #[test]
    fn article_wins_over_class_based_selectors() {
        let html = r#"
            <body>
                <div class="docs-content">wrong: class selector</div>
                <article>right: article element</article>
            </body>
        "#;
        let located = locate_main_content(html);
        assert!(located.contains("right: article element"));
        assert!(!located.contains("wrong"));
    }

    #[test]
    fn docs_content_class_is_found_when_no_earlier_selector_matches() {
        let html = r#"
            <body>
                <nav>site nav</nav>
                <div class="docs-content">right: picked via class fallback</div>
            </body>
        "#;
        let located = locate_main_content(html);
        assert!(located.contains("right: picked via class fallback"));
    }

    #[test]
    fn falls_back_to_body_when_no_selector_in_the_list_matches() {
        let html = r#"<body><div id="wrapper"><p>only a bare div</p></div></body>"#;
        let located = locate_main_content(html);
        assert!(located.contains("only a bare div"));
    }
}
