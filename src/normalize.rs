//! Text normalization applied to every question, answer, and context before
//! it is embedded or indexed.
//!
//! Each pass is a function `&str -> String` applied in sequence. Every
//! stripped span is replaced by a space so that removal never glues two
//! neighbouring words together; the last pass collapses the resulting
//! whitespace. The output contains only lower-case word characters separated
//! by single spaces, which makes [`normalize`] idempotent.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full normalization pipeline on one text field.
pub fn normalize(text: &str) -> String {
    let mut result = text.to_lowercase();

    result = strip_urls(&result);
    result = strip_http_fragments(&result);
    result = strip_html_tags(&result);
    result = strip_emoji(&result);
    result = strip_non_word(&result);
    result = collapse_whitespace(&result);

    result
}

fn strip_urls(text: &str) -> String {
    static URL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid regex"));

    URL_RE.replace_all(text, " ").into_owned()
}

/// Drop bare `http` tokens left behind by malformed links.
fn strip_http_fragments(text: &str) -> String {
    text.replace("http", " ")
}

fn strip_html_tags(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<.*?>+").expect("valid regex"));

    TAG_RE.replace_all(text, " ").into_owned()
}

/// Emoticons, pictographs, transport symbols, and regional indicators.
fn strip_emoji(text: &str) -> String {
    static EMOJI_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[\x{1F600}-\x{1F64F}\x{1F300}-\x{1F5FF}\x{1F680}-\x{1F6FF}\x{1F1E0}-\x{1F1FF}]")
            .expect("valid regex")
    });

    EMOJI_RE.replace_all(text, " ").into_owned()
}

fn strip_non_word(text: &str) -> String {
    static NON_WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

    NON_WORD_RE.replace_all(text, " ").into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
