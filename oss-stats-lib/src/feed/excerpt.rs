//! Plain-text excerpts of markdown content.

use regex::Regex;
use std::sync::LazyLock;

/// Appended to an excerpt that was cut short.
pub const ELLIPSIS: &str = "...";

static CODE_FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```[\s\S]*?```").expect("invalid regex"));
static INLINE_CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").expect("invalid regex"));
static IMAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("invalid regex"));
static LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("invalid regex"));
static HTML_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("invalid regex"));
static HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").expect("invalid regex"));
static BLOCKQUOTE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*>[ \t]?").expect("invalid regex"));
static RULE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*([-*_][ \t]*){3,}$").expect("invalid regex"));
static LIST_MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[ \t]*([-*+]|\d+\.)[ \t]+").expect("invalid regex"));
static BOLD_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").expect("invalid regex"));
static ITALIC_STAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\s][^*]*)\*").expect("invalid regex"));
static ITALIC_UNDERSCORE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(^|\s)_([^_]+)_").expect("invalid regex"));
static STRIKE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~([^~]+)~~").expect("invalid regex"));
static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("invalid regex"));

/// Reduce markdown to plain text.
#[must_use]
pub fn strip_markdown(content: &str) -> String {
    let text = CODE_FENCE_REGEX.replace_all(content, " ");
    let text = IMAGE_REGEX.replace_all(&text, "");
    let text = LINK_REGEX.replace_all(&text, "$1");
    let text = INLINE_CODE_REGEX.replace_all(&text, "$1");
    let text = HTML_TAG_REGEX.replace_all(&text, "");
    let text = RULE_REGEX.replace_all(&text, "");
    let text = HEADER_REGEX.replace_all(&text, "");
    let text = BLOCKQUOTE_REGEX.replace_all(&text, "");
    let text = LIST_MARKER_REGEX.replace_all(&text, "");
    let text = BOLD_REGEX.replace_all(&text, "$1$2");
    let text = ITALIC_STAR_REGEX.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE_REGEX.replace_all(&text, "$1$2");
    let text = STRIKE_REGEX.replace_all(&text, "$1");
    WHITESPACE_REGEX.replace_all(&text, " ").trim().to_string()
}

/// Build a plain-text excerpt of at most `max_len` characters plus [`ELLIPSIS`].
///
/// Text that already fits is returned whole. Otherwise it is cut at the last whitespace at or
/// before `max_len` characters so no word is split; a single word longer than `max_len` is cut
/// at `max_len`.
#[must_use]
pub fn generate_excerpt(content: &str, max_len: usize) -> String {
    let text = strip_markdown(content);
    if text.chars().count() <= max_len {
        return text;
    }

    // Whitespace at char position `max_len` still leaves `max_len` whole characters before it
    let cut = text
        .char_indices()
        .take(max_len + 1)
        .filter(|(_, ch)| ch.is_whitespace())
        .map(|(idx, _)| idx)
        .last();

    let mut excerpt = match cut.and_then(|idx| text.get(..idx)) {
        Some(head) if !head.trim_end().is_empty() => head.trim_end().to_string(),
        _ => text.chars().take(max_len).collect(),
    };

    excerpt.push_str(ELLIPSIS);
    excerpt
}
