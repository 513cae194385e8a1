//! Plain-text extraction from untrusted HTML fragments.
//!
//! The detail scraper and the feed parser only ever need short text values
//! out of third-party markup, so this stays a small regex-based stripper
//! behind a few functions ([`strip_tags`], [`clean_text`],
//! [`remove_scripts`]). Callers never see the regexes.

use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^<>]*>").expect("valid regex"));
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*(script|style)[^>]*>.*?<\s*/\s*(script|style)\s*>").expect("valid regex")
});
static BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*(br|/p|/div|/li|/tr)\s*/?\s*>").expect("valid regex"));
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]{1,6}|[0-9]{1,7});").expect("valid regex"));

/// Upper bound on strip passes; real markup reaches a fixed point in two or three.
const MAX_PASSES: usize = 32;

/// Remove every tag, repeating until the text stops changing.
///
/// Each pass decodes entities and then removes `<…>` spans, so encoded or
/// nested markup (`&lt;b&gt;`, `<<b>b>`) cannot survive as a tag. After the
/// fixed point any unmatched `<` or `>` is dropped, leaving text with no
/// angle brackets at all.
pub fn strip_tags(html: &str) -> String {
    let mut text = remove_scripts(html);
    text = BREAK_RE.replace_all(&text, "\n").into_owned();

    for _ in 0..MAX_PASSES {
        let decoded = decode_entities(&text);
        let stripped = TAG_RE.replace_all(&decoded, "").into_owned();
        if stripped == text {
            break;
        }
        text = stripped;
    }

    text.retain(|c| c != '<' && c != '>');
    text
}

/// Drop `<script>` and `<style>` elements including their bodies.
pub fn remove_scripts(html: &str) -> String {
    SCRIPT_RE.replace_all(html, " ").into_owned()
}

/// Strip tags and normalize whitespace into single spaces; `None` if nothing is left.
pub fn clean_text(html: &str) -> Option<String> {
    let collapsed = collapse_whitespace(&strip_tags(html));
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Collapse runs of whitespace (including non-breaking spaces) into one space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode the named entities seen in practice plus all numeric entities.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let numeric = NUMERIC_ENTITY_RE.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = if let Some(hex) = raw.strip_prefix('x') {
            u32::from_str_radix(hex, 16).ok()
        } else {
            raw.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });

    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
