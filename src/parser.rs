//! Page body → paragraphs → sentences → cleaned word tokens.

use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Bracketed footnote markers like `[1]` or `[citation needed]`.
static FOOTNOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[.*?\]").unwrap());

/// Terminal punctuation (optionally followed by closing quotes/brackets)
/// and the whitespace that ends a sentence.
static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]['")\]]*\s+"#).unwrap());

/// Characters stripped from every retained token.
const STRIP_CHARS: &[char] = &[',', '\'', '(', ')', '[', ']', '"', '.'];

/// Parse one page body into paragraphs of sentences of cleaned tokens.
///
/// Only direct-child `<p>` elements of the first `div.mw-parser-output` are
/// considered, and the first of them is always skipped: on Wikipedia page
/// bodies it is an empty lead element. Pages without that structure are not
/// handled gracefully.
pub fn parse_page(raw_html: &str) -> Result<Vec<Vec<Vec<String>>>> {
    let document = Html::parse_document(raw_html);
    let selector = Selector::parse("div.mw-parser-output").unwrap();
    let Some(main_div) = document.select(&selector).next() else {
        bail!("No mw-parser-output div in page");
    };

    let paragraphs: Vec<ElementRef> = main_div
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "p")
        .collect();

    let mut parsed = Vec::new();
    for par in paragraphs.iter().skip(1) {
        let text: String = par.text().collect();
        let text = FOOTNOTE_RE.replace_all(&text, "");

        let mut sentences = Vec::new();
        for sentence in split_sentences(&text) {
            let words: Vec<String> = sentence
                .split_whitespace()
                .filter(|w| !is_numeric(w))
                .map(strip_punctuation)
                .collect();
            sentences.push(words);
        }
        parsed.push(sentences);
    }

    Ok(parsed)
}

/// Split paragraph text into sentences on terminal punctuation followed by
/// whitespace, keeping the punctuation with its sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn is_numeric(w: &str) -> bool {
    !w.is_empty() && w.chars().all(|c| c.is_numeric())
}

fn strip_punctuation(w: &str) -> String {
    w.chars().filter(|c| !STRIP_CHARS.contains(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!(
            "<html><body><div class=\"mw-parser-output\">{}</div></body></html>",
            body
        )
    }

    #[test]
    fn lead_paragraph_is_skipped_and_tokens_cleaned() {
        let html = page("<p></p><p>The plant (Solanum) grows well.[1]</p>");
        let parsed = parse_page(&html).unwrap();
        assert_eq!(
            parsed,
            vec![vec![vec!["The", "plant", "Solanum", "grows", "well"]]]
        );
    }

    #[test]
    fn only_direct_child_paragraphs_count() {
        let html = page(
            "<p></p><p>Outer text here</p><div><p>Nested paragraph ignored</p></div>",
        );
        let parsed = parse_page(&html).unwrap();
        assert_eq!(parsed, vec![vec![vec!["Outer", "text", "here"]]]);
    }

    #[test]
    fn paragraphs_split_into_sentences() {
        let html = page("<p></p><p>First sentence here. Second one too!</p>");
        let parsed = parse_page(&html).unwrap();
        assert_eq!(
            parsed,
            vec![vec![
                vec!["First", "sentence", "here"],
                vec!["Second", "one", "too!"]
            ]]
        );
    }

    #[test]
    fn numeric_tokens_are_dropped() {
        let html = page("<p></p><p>Grows 30 cm tall</p>");
        let parsed = parse_page(&html).unwrap();
        assert_eq!(parsed, vec![vec![vec!["Grows", "cm", "tall"]]]);
    }

    #[test]
    fn footnotes_are_removed_per_marker() {
        let html = page("<p></p><p>Known[2] species[citation needed] vary</p>");
        let parsed = parse_page(&html).unwrap();
        assert_eq!(parsed, vec![vec![vec!["Known", "species", "vary"]]]);
    }

    #[test]
    fn empty_following_paragraphs_become_empty_entries() {
        let html = page("<p></p><p></p><p>Real text</p>");
        let parsed = parse_page(&html).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].is_empty());
        assert_eq!(parsed[1], vec![vec!["Real", "text"]]);
    }

    #[test]
    fn page_without_content_div_is_an_error() {
        assert!(parse_page("<html><body><p>bare</p></body></html>").is_err());
    }

    #[test]
    fn sentences_keep_their_punctuation() {
        let sentences = split_sentences("One. Two? Three");
        assert_eq!(sentences, vec!["One.", "Two?", "Three"]);
    }

    #[test]
    fn empty_text_has_no_sentences() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }
}
