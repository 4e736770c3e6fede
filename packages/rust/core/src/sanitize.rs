//! Field sanitization applied to every cell before validation.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum length of a sanitized field, in characters.
pub const MAX_FIELD_LEN: usize = 500;

/// Characters that never survive sanitization.
pub const FORBIDDEN_CHARS: [char; 6] = ['<', '>', '\'', '"', '`', ';'];

/// Matches anything shaped like an HTML tag. Not a real HTML parser.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// Strip tags and quoting characters, trim, and cap the length.
///
/// Idempotent: the output contains no `<`, so a second pass finds no tags,
/// and trimming happens after truncation.
pub fn sanitize(input: &str) -> String {
    let without_tags = TAG_RE.replace_all(input, "");

    let cleaned: String = without_tags
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect();

    let truncated: String = cleaned.trim().chars().take(MAX_FIELD_LEN).collect();
    truncated.trim_end().to_string()
}
