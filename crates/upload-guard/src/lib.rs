//! Fail-closed sanitization of untrusted SVG and XML uploads.
//!
//! Documents are parsed by a hardened parser (no DTDs, no entity
//! declarations, no external resources), checked against an expected root
//! element, stripped of forbidden elements, event handler attributes and
//! dangerous URIs, and re-serialized as UTF-8. Anything ambiguous is
//! rejected rather than repaired.
//!
//! ```
//! let clean = upload_guard::sanitize_svg(br#"<svg onload="alert(1)"><circle r="4"/></svg>"#)?;
//! assert!(!String::from_utf8_lossy(&clean).contains("onload"));
//! # Ok::<_, upload_guard::SanitizeError>(())
//! ```

pub mod error;
pub mod policy;
pub mod sanitize;
pub mod threat;
pub mod tree;
pub mod upload;

pub use error::{ConfigError, ErrorKind, SanitizeError};
pub use policy::{AttributeThreat, Policy, PolicyBase, PolicyConfig};
pub use sanitize::{sanitize_svg, sanitize_xml, Report, Sanitized, Sanitizer};
pub use upload::{sanitize_upload, Upload, UploadGuard, UploadKind};
