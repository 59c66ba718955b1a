//! Main-content, title and summary extraction from raw HTML.
//!
//! The default [`LargestBlockExtractor`] is a heuristic, not a guarantee:
//!
//! 1. Text inside `script`, `style`, `nav`, `header`, `footer`, `aside` (and a
//!    few other non-content tags) is never collected.
//! 2. The title is the first non-empty of: first `<h1>`, `<title>`, the
//!    `og:title` meta tag. Otherwise [`NO_TITLE`].
//! 3. Candidate blocks are `<article>`, `<main>`, and `div`/`section`
//!    elements whose class mentions content/article/post/entry. The one with
//!    the most text wins; without candidates the whole `<body>` is used.
//! 4. Text is normalised line by line and cut to the configured length.
//! 5. The summary is the first three sentences longer than the configured
//!    minimum, joined and cut to the configured length.
//!
//! Other strategies plug in through [`ContentExtractor`] without touching
//! the concurrency layer.

use crate::config::ScraperConfig;
use crate::error::ExtractError;
use crate::models::NO_TITLE;
use crate::utils::{collapse_whitespace, truncate_chars};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

/// Tags whose text never counts as article content.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "iframe",
];

const SUMMARY_SENTENCES: usize = 3;

static H1_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1").expect("Failed to parse h1 selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("Failed to parse title selector"));
static OG_TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:title"]"#).expect("Failed to parse og:title selector")
});
static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("Failed to parse body selector"));
static CANDIDATE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("article, main, div[class], section[class]")
        .expect("Failed to parse candidate selector")
});
static CONTENT_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)content|article|post|entry").expect("Failed to compile class regex"));
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("Failed to compile sentence regex"));

/// What an extractor pulls out of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub content: String,
    pub summary: String,
}

/// Strategy for turning HTML into title, content and summary.
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Result<Extracted, ExtractError>;
}

/// Picks the largest content-looking block on the page.
#[derive(Debug, Clone)]
pub struct LargestBlockExtractor {
    max_content_chars: usize,
    max_summary_chars: usize,
    min_sentence_chars: usize,
}

impl LargestBlockExtractor {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            max_content_chars: config.max_content_chars,
            max_summary_chars: config.max_summary_chars,
            min_sentence_chars: config.min_sentence_chars,
        }
    }
}

impl ContentExtractor for LargestBlockExtractor {
    fn extract(&self, html: &str) -> Result<Extracted, ExtractError> {
        let document = Html::parse_document(html);

        let title = extract_title(&document).unwrap_or_else(|| NO_TITLE.to_string());

        let content = largest_block_text(&document)
            .or_else(|| {
                document
                    .select(&BODY_SELECTOR)
                    .next()
                    .map(visible_text)
                    .map(|text| normalize_lines(&text))
            })
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ExtractError::Empty);
        }
        let content = truncate_chars(&content, self.max_content_chars);
        let summary = summarize(&content, self.min_sentence_chars, self.max_summary_chars);

        Ok(Extracted {
            title,
            content,
            summary,
        })
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let first_text = |selector: &Selector| {
        document
            .select(selector)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|title| !title.is_empty())
    };
    first_text(&H1_SELECTOR)
        .or_else(|| first_text(&TITLE_SELECTOR))
        .or_else(|| {
            document
                .select(&OG_TITLE_SELECTOR)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(collapse_whitespace)
                .filter(|title| !title.is_empty())
        })
}

/// Normalised text of the best candidate block, if any candidate has text.
fn largest_block_text(document: &Html) -> Option<String> {
    let mut best: Option<String> = None;
    let mut best_len = 0;
    for element in document.select(&CANDIDATE_SELECTOR) {
        if !is_content_candidate(element) || inside_stripped(element) {
            continue;
        }
        let text = normalize_lines(&visible_text(element));
        let len = text.chars().count();
        // Strictly greater keeps the first block on ties.
        if len > best_len {
            best_len = len;
            best = Some(text);
        }
    }
    best
}

fn is_content_candidate(element: ElementRef<'_>) -> bool {
    let value = element.value();
    match value.name() {
        "article" | "main" => true,
        _ => value
            .attr("class")
            .is_some_and(|class| CONTENT_CLASS.is_match(class)),
    }
}

fn inside_stripped(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| STRIPPED_TAGS.contains(&ancestor.value().name()))
}

/// Text of `element` with one line per text node, skipping stripped tags.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    out.push_str(text);
                    out.push('\n');
                }
            }
            Node::Element(el) if STRIPPED_TAGS.contains(&el.name()) => {}
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }
}

/// Trim every line, drop the empty ones and rejoin with `\n`.
pub fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First sentences of `content`, as a short plain-text summary.
///
/// Sentences end at `.`, `!` or `?`. Fragments of `min_sentence_chars`
/// characters or fewer are skipped. The result ends with a period and holds
/// at most `max_chars` characters; it is empty when no sentence qualifies.
pub fn summarize(content: &str, min_sentence_chars: usize, max_chars: usize) -> String {
    let sentences: Vec<String> = SENTENCE_END
        .split(content)
        .map(collapse_whitespace)
        .filter(|sentence| sentence.chars().count() > min_sentence_chars)
        .take(SUMMARY_SENTENCES)
        .collect();
    if sentences.is_empty() {
        return String::new();
    }
    let mut summary = sentences.join(". ");
    if !summary.ends_with('.') {
        summary.push('.');
    }
    truncate_chars(&summary, max_chars)
}
