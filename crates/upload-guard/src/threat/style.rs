//! CSS vectors in `style` attributes and `<style>` blocks.
//!
//! Only constructs that execute code or bind behavior are flagged. `data:`
//! URLs in CSS are left alone: inside `url()` they only ever load images or
//! fonts.

use super::normalize_value;

const STYLE_NEEDLES: &[&str] = &[
    "javascript:",
    "vbscript:",
    "expression(",
    "-moz-binding",
    "behavior:",
];

/// True when a CSS fragment (attribute value or block text) is dangerous.
pub fn is_dangerous_style(css: &str) -> bool {
    let normalized = normalize_value(css);
    STYLE_NEEDLES
        .iter()
        .any(|needle| normalized.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_javascript_url() {
        assert!(is_dangerous_style("background: url(javascript:alert(1))"));
        assert!(is_dangerous_style("background: url( 'Java Script:alert(1)' )"));
    }

    #[test]
    fn test_expression_and_bindings() {
        assert!(is_dangerous_style("width: expression(alert(1))"));
        assert!(is_dangerous_style("-moz-binding: url(evil.xml#x)"));
        assert!(is_dangerous_style("behavior: url(evil.htc)"));
    }

    #[test]
    fn test_benign_css() {
        assert!(!is_dangerous_style("fill: #003399; stroke-width: 2"));
        assert!(!is_dangerous_style("font-family: 'Marianne'; src: url(data:font/woff2;base64,AAAA)"));
    }
}
