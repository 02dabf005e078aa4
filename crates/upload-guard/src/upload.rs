//! Upload routing: decide from MIME type and filename whether an upload goes
//! through the SVG sanitizer, the generic XML sanitizer, or neither.

use crate::error::Result;
use crate::policy::Policy;
use crate::sanitize::{Report, Sanitizer};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::info;

static DEFAULT_GUARD: LazyLock<UploadGuard> = LazyLock::new(UploadGuard::default);

/// Which sanitization path an upload takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Svg,
    Xml,
    /// Not a document this crate understands; passed through untouched.
    Other,
}

impl UploadKind {
    /// Classify an upload. SVG wins when both SVG and XML markers match.
    pub fn detect(mime: Option<&str>, filename: &str) -> Self {
        let mime = mime.map(essence).unwrap_or_default();
        let filename = filename.trim().to_ascii_lowercase();

        if mime == "image/svg+xml" || filename.ends_with(".svg") {
            UploadKind::Svg
        } else if mime == "application/xml" || mime == "text/xml" || filename.ends_with(".xml") {
            UploadKind::Xml
        } else {
            UploadKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::Svg => "svg",
            UploadKind::Xml => "xml",
            UploadKind::Other => "other",
        }
    }
}

/// MIME type without parameters, lowercased (`Text/XML; charset=utf-8` -> `text/xml`).
fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// A processed upload, ready to replace the original stream.
#[derive(Debug, Clone)]
pub struct Upload<'a> {
    pub kind: UploadKind,
    pub content: Cow<'a, [u8]>,
    pub report: Report,
}

/// Pair of sanitizers an upload handler dispatches between.
#[derive(Debug, Clone)]
pub struct UploadGuard {
    svg: Sanitizer,
    xml: Sanitizer,
}

impl UploadGuard {
    pub fn new(svg: Policy, xml: Policy) -> Self {
        Self {
            svg: Sanitizer::new(svg),
            xml: Sanitizer::new(xml),
        }
    }

    pub fn sanitizer(&self, kind: UploadKind) -> Option<&Sanitizer> {
        match kind {
            UploadKind::Svg => Some(&self.svg),
            UploadKind::Xml => Some(&self.xml),
            UploadKind::Other => None,
        }
    }

    /// Route and sanitize one upload.
    pub fn process<'a>(
        &self,
        mime: Option<&str>,
        filename: &str,
        content: &'a [u8],
    ) -> Result<Upload<'a>> {
        let kind = UploadKind::detect(mime, filename);
        self.process_as(kind, filename, content)
    }

    /// Sanitize with an explicitly chosen path.
    pub fn process_as<'a>(
        &self,
        kind: UploadKind,
        filename: &str,
        content: &'a [u8],
    ) -> Result<Upload<'a>> {
        let Some(sanitizer) = self.sanitizer(kind) else {
            return Ok(Upload {
                kind,
                content: Cow::Borrowed(content),
                report: Report::default(),
            });
        };

        info!(kind = kind.as_str(), filename, "sanitizing upload");
        let sanitized = sanitizer.sanitize_with_report(content)?;
        Ok(Upload {
            kind,
            content: Cow::Owned(sanitized.bytes),
            report: sanitized.report,
        })
    }
}

impl Default for UploadGuard {
    fn default() -> Self {
        Self::new(Policy::svg(), Policy::xml())
    }
}

/// Route and sanitize an upload with the built-in policies.
pub fn sanitize_upload<'a>(
    mime: Option<&str>,
    filename: &str,
    content: &'a [u8],
) -> Result<Cow<'a, [u8]>> {
    DEFAULT_GUARD
        .process(mime, filename, content)
        .map(|upload| upload.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SanitizeError;

    #[test]
    fn test_detect_by_mime() {
        assert_eq!(UploadKind::detect(Some("image/svg+xml"), "logo"), UploadKind::Svg);
        assert_eq!(UploadKind::detect(Some("application/xml"), "feed"), UploadKind::Xml);
        assert_eq!(
            UploadKind::detect(Some("Text/XML; charset=utf-8"), "feed"),
            UploadKind::Xml
        );
        assert_eq!(UploadKind::detect(Some("text/csv"), "data.csv"), UploadKind::Other);
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(UploadKind::detect(None, "Logo.SVG"), UploadKind::Svg);
        assert_eq!(UploadKind::detect(Some(""), "metadata.xml"), UploadKind::Xml);
        assert_eq!(UploadKind::detect(None, "report.pdf"), UploadKind::Other);
    }

    #[test]
    fn test_svg_wins_over_xml() {
        assert_eq!(
            UploadKind::detect(Some("application/xml"), "icon.svg"),
            UploadKind::Svg
        );
    }

    #[test]
    fn test_other_passes_through_borrowed() {
        let content = b"id,name\n1,<script>";
        let out = sanitize_upload(Some("text/csv"), "data.csv", content).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.as_ref(), content);
    }

    #[test]
    fn test_svg_upload_sanitized() {
        let out = sanitize_upload(
            Some("image/svg+xml"),
            "logo.svg",
            br#"<svg onload="alert(1)"><circle r="1"/></svg>"#,
        )
        .unwrap();
        let text = String::from_utf8(out.into_owned()).unwrap();
        assert!(!text.contains("onload"));
        assert!(text.contains("<circle"));
    }

    #[test]
    fn test_xml_upload_sanitized_without_root_restriction() {
        let guard = UploadGuard::default();
        let upload = guard
            .process(None, "catalog.xml", b"<catalog><script>x()</script></catalog>")
            .unwrap();
        assert_eq!(upload.kind, UploadKind::Xml);
        assert_eq!(upload.report.removed(), 1);
    }

    #[test]
    fn test_rejected_upload_maps_to_bad_request() {
        let err = sanitize_upload(None, "logo.svg", b"<svg>").unwrap_err();
        assert!(matches!(err, SanitizeError::Malformed(_)));
        assert_eq!(err.http_status(), 400);
    }
}
