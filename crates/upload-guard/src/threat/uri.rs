//! Dangerous URI detection for URI-bearing attributes.

use super::normalize_value;
use regex::Regex;

/// Matcher for URIs whose scheme can execute code or smuggle a document.
///
/// Two checks run on the normalized value: an anchored scheme regex and a
/// plain substring search for `<scheme>:` anywhere in the value.
#[derive(Debug, Clone)]
pub struct UriMatcher {
    prefix: Option<Regex>,
    needles: Vec<String>,
}

impl UriMatcher {
    /// Build a matcher for the given schemes (without the trailing colon).
    pub fn new<S: AsRef<str>>(schemes: &[S]) -> Result<Self, regex::Error> {
        let alternation = schemes
            .iter()
            .map(|s| regex::escape(&s.as_ref().to_ascii_lowercase()))
            .collect::<Vec<_>>()
            .join("|");
        let prefix = if alternation.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"^(?:{alternation}):"))?)
        };
        let needles = schemes
            .iter()
            .map(|s| format!("{}:", s.as_ref().to_ascii_lowercase()))
            .collect();
        Ok(Self { prefix, needles })
    }

    /// True when the raw attribute value carries a dangerous URI.
    pub fn is_dangerous(&self, raw: &str) -> bool {
        let normalized = normalize_value(raw);
        self.prefix.as_ref().is_some_and(|re| re.is_match(&normalized))
            || self.needles.iter().any(|needle| normalized.contains(needle.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> UriMatcher {
        UriMatcher::new(&["javascript", "vbscript", "data"]).unwrap()
    }

    #[test]
    fn test_plain_schemes() {
        let m = matcher();
        assert!(m.is_dangerous("javascript:alert(1)"));
        assert!(m.is_dangerous("VBScript:msgbox(1)"));
        assert!(m.is_dangerous("data:text/html,<script>alert(1)</script>"));
    }

    #[test]
    fn test_obfuscated_schemes() {
        let m = matcher();
        assert!(m.is_dangerous("  java\nscript:alert(1)"));
        assert!(m.is_dangerous("&#106;avascript:alert(1)"));
        assert!(m.is_dangerous("&#x6A;&#x61;vascript:alert(1)"));
        assert!(m.is_dangerous("JaVaScRiPt:alert(1)"));
    }

    #[test]
    fn test_substring_net() {
        let m = matcher();
        assert!(m.is_dangerous("x-javascript:alert(1)"));
    }

    #[test]
    fn test_benign_uris() {
        let m = matcher();
        assert!(!m.is_dangerous("#icon"));
        assert!(!m.is_dangerous("https://dados.gov.pt/logo.svg"));
        assert!(!m.is_dangerous("images/datatable.png"));
    }

    #[test]
    fn test_empty_scheme_list_matches_nothing() {
        let m = UriMatcher::new::<&str>(&[]).unwrap();
        assert!(!m.is_dangerous("javascript:alert(1)"));
    }
}
