//! Value-level threat detection: obfuscation-resistant URI and CSS checks.

pub mod style;
pub mod uri;

/// Characters browsers skip or that only serve to hide a scheme.
pub(crate) fn is_invisible(c: char) -> bool {
    c.is_whitespace()
        || c.is_control()
        || matches!(
            c,
            '\u{200B}' // Zero-width space
            | '\u{200C}' // Zero-width non-joiner
            | '\u{200D}' // Zero-width joiner
            | '\u{2060}' // Word joiner
            | '\u{FEFF}' // BOM / zero-width no-break space
            | '\u{00AD}' // Soft hyphen
        )
}

/// Decode HTML entities until the value stops changing.
///
/// Double-encoded payloads (`&amp;#106;`) need more than one pass. The loop
/// is bounded since every pass that changes the string shortens it.
pub(crate) fn decode_entities(value: &str) -> String {
    const MAX_PASSES: usize = 8;

    let mut current = value.to_string();
    for _ in 0..MAX_PASSES {
        let decoded = html_escape::decode_html_entities(&current);
        if decoded == current {
            break;
        }
        current = decoded.into_owned();
    }
    current
}

/// Canonical form used for every value check: entities decoded, invisible
/// characters removed, ASCII-lowercased.
pub fn normalize_value(value: &str) -> String {
    decode_entities(value)
        .chars()
        .filter(|c| !is_invisible(*c))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
