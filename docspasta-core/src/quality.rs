//! Deterministic quality scorer (SPEC_FULL.md §4.3).
//!
//! Additive, bounded to `[0, 100]`. Pure function of already-extracted
//! content — no network or storage I/O, same separation of concerns as
//! `normalize`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```").expect("valid regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`\n]+`").expect("valid regex"));
static CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[{};]\s*$|^\s*(fn|def|function|class|import|const|let)\s").expect("valid regex"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s").expect("valid regex"));
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s").expect("valid regex"));
static MD_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]+\]\([^)]+\)").expect("valid regex"));
static ERROR_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)404 not found|page not found|access denied|forbidden|internal server error")
        .expect("valid regex")
});
static DOC_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(api|reference|documentation|guide|tutorial|usage|example|install|configuration|parameter)\b")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Reject,
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl QualityBand {
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s < 20 => QualityBand::Reject,
            s if s < 40 => QualityBand::Poor,
            s if s < 60 => QualityBand::Acceptable,
            s if s < 80 => QualityBand::Good,
            _ => QualityBand::Excellent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: i32,
    pub band: QualityBand,
    pub reason: String,
}

/// Inputs needed to score a fetched+extracted page. Kept separate from
/// `docspasta_extract`'s richer `ExtractedPage` so this crate has no
/// dependency on the extractor.
pub struct ScoreInput<'a> {
    pub http_status: u16,
    pub body_len: usize,
    pub markdown: &'a str,
    pub url: &'a str,
    pub title: Option<&'a str>,
}

/// Score extracted content 0-100 per the additive factor table.
pub fn score(input: &ScoreInput) -> QualityReport {
    let mut total = 0i32;
    let mut reasons = Vec::new();

    if (200..300).contains(&input.http_status) || input.http_status == 304 {
        total += 20;
        reasons.push("status_ok");
    }

    if input.body_len > 100 {
        total += 20;
        reasons.push("body_length");
    }

    let non_code_len = non_code_text_len(input.markdown);
    if non_code_len > 200 {
        total += 25;
        reasons.push("prose_length");
    }

    let headings = HEADING.find_iter(input.markdown).count();
    let has_lists = LIST_ITEM.is_match(input.markdown);
    let links = MD_LINK.find_iter(input.markdown).count();
    let keyword_matches = DOC_KEYWORD.find_iter(input.markdown).count();
    let mut signals = 0;
    if headings >= 2 {
        signals += 1;
    }
    if has_lists {
        signals += 1;
    }
    if links >= 3 {
        signals += 1;
    }
    if links >= 8 {
        signals += 1;
    }
    if keyword_matches >= 2 {
        signals += 1;
    }
    if keyword_matches >= 4 {
        signals += 1;
    }
    if signals >= 4 {
        total += 20;
        reasons.push("structure_signals");
    }

    let inline_code_count = INLINE_CODE.find_iter(input.markdown).count();
    if FENCED_CODE.find_iter(input.markdown).count() >= 2
        || inline_code_count >= 3
        || CODE_PATTERN.is_match(input.markdown)
    {
        total += 10;
        reasons.push("code_evidence");
    }

    let token_estimate = input.markdown.len() / 4;
    if token_estimate > 100 && token_estimate < 8000 {
        total += 5;
        reasons.push("token_range");
    }

    if input.url.contains("/docs/") {
        total += 5;
        reasons.push("docs_path");
    }
    if input.url.contains("/api/") || input.url.contains("/reference/") {
        total += 5;
        reasons.push("api_path");
    }

    let error_heuristic = input.http_status >= 400
        || ERROR_PHRASE.is_match(input.markdown)
        || input
            .title
            .map(|t| ERROR_PHRASE.is_match(t))
            .unwrap_or(false);
    if error_heuristic {
        total -= 50;
        reasons.push("error_page_heuristic");
    }

    let clamped = total.clamp(0, 100);
    QualityReport {
        score: clamped,
        band: QualityBand::from_score(clamped),
        reason: reasons.join(","),
    }
}

/// Strip fenced code blocks before measuring "prose" length, so a page
/// that's mostly a giant code sample doesn't inflate its prose-length score.
fn non_code_text_len(markdown: &str) -> usize {
    let mut len = 0;
    let mut in_fence = false;
    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            len += line.len();
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(status: u16, markdown: &'a str, url: &'a str) -> ScoreInput<'a> {
        ScoreInput {
            http_status: status,
            body_len: markdown.len(),
            markdown,
            url,
            title: None,
        }
    }

    #[test]
    fn empty_body_scores_low() {
        let r = score(&input(200, "", "https://example.com/x"));
        assert!(r.score <= 20, "got {}", r.score);
    }

    #[test]
    fn rich_doc_page_scores_excellent() {
        let md = format!(
            "# Getting Started\n\n## Installation\n\n{}\n\n```rust\nfn main() {{}}\n```\n\n- step one\n- step two\n- step three\n\n{}",
            "This guide explains the API reference in detail. ".repeat(10),
            (0..10)
                .map(|i| format!("[link {i}](https://example.com/{i})"))
                .collect::<Vec<_>>()
                .join(" ")
        );
        let r = score(&input(200, &md, "https://example.com/docs/api/guide"));
        assert_eq!(r.band, QualityBand::Excellent, "score was {}", r.score);
    }

    #[test]
    fn error_status_is_penalized() {
        let r = score(&input(500, "Internal Server Error", "https://example.com/x"));
        assert_eq!(r.score, 0);
        assert_eq!(r.band, QualityBand::Reject);
    }

    #[test]
    fn error_phrase_in_body_penalizes_even_with_200() {
        let md = "# 404 Not Found\n\nThe page you requested could not be located anywhere on this entire server.";
        let r = score(&input(200, md, "https://example.com/missing"));
        // +20 status +20 body len +25 prose - 50 error = 15
        assert!(r.score < 20);
    }

    #[test]
    fn docs_and_api_path_bonuses_stack() {
        let r1 = score(&input(200, "hello", "https://example.com/docs/x"));
        let r2 = score(&input(200, "hello", "https://example.com/api/x"));
        let r3 = score(&input(200, "hello", "https://example.com/plain"));
        assert!(r1.score > r3.score);
        assert!(r2.score > r3.score);
    }

    #[test]
    fn score_never_goes_negative() {
        let r = score(&input(500, "access denied forbidden", "https://example.com/x"));
        assert_eq!(r.score, 0);
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(QualityBand::from_score(0), QualityBand::Reject);
        assert_eq!(QualityBand::from_score(19), QualityBand::Reject);
        assert_eq!(QualityBand::from_score(20), QualityBand::Poor);
        assert_eq!(QualityBand::from_score(39), QualityBand::Poor);
        assert_eq!(QualityBand::from_score(40), QualityBand::Acceptable);
        assert_eq!(QualityBand::from_score(59), QualityBand::Acceptable);
        assert_eq!(QualityBand::from_score(60), QualityBand::Good);
        assert_eq!(QualityBand::from_score(79), QualityBand::Good);
        assert_eq!(QualityBand::from_score(80), QualityBand::Excellent);
        assert_eq!(QualityBand::from_score(100), QualityBand::Excellent);
    }
}
