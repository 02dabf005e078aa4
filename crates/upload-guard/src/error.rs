//! Error types for sanitization and policy configuration.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why an upload was rejected. Every variant is a rejection: the sanitizer
/// never hands back partially processed content.
#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("input is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("malformed XML: {0}")]
    Malformed(String),

    #[error("unexpected root element <{found}>")]
    UnexpectedRoot { found: String },

    #[error("sanitization failed: {0}")]
    Failure(String),
}

/// Coarse classification of a [`SanitizeError`], stable enough to log and
/// to key client responses on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TooLarge,
    MalformedInput,
    UnexpectedRootType,
    SanitizationFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TooLarge => "too_large",
            ErrorKind::MalformedInput => "malformed_input",
            ErrorKind::UnexpectedRootType => "unexpected_root_type",
            ErrorKind::SanitizationFailure => "sanitization_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SanitizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SanitizeError::TooLarge { .. } => ErrorKind::TooLarge,
            SanitizeError::Malformed(_) => ErrorKind::MalformedInput,
            SanitizeError::UnexpectedRoot { .. } => ErrorKind::UnexpectedRootType,
            SanitizeError::Failure(_) => ErrorKind::SanitizationFailure,
        }
    }

    /// Message safe to show to the uploader. Parser details stay server-side.
    pub fn public_message(&self) -> &'static str {
        match self {
            SanitizeError::TooLarge { .. } => "file exceeds the maximum allowed size",
            SanitizeError::Malformed(_) => "file is not well-formed XML",
            SanitizeError::UnexpectedRoot { .. } => "file is not of the expected document type",
            SanitizeError::Failure(_) => "file could not be processed safely",
        }
    }

    /// HTTP status an upload handler should answer with.
    pub fn http_status(&self) -> u16 {
        400
    }

    pub(crate) fn malformed(err: impl fmt::Display) -> Self {
        SanitizeError::Malformed(err.to_string())
    }
}

impl From<quick_xml::Error> for SanitizeError {
    fn from(err: quick_xml::Error) -> Self {
        SanitizeError::malformed(err)
    }
}

impl From<quick_xml::events::attributes::AttrError> for SanitizeError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        SanitizeError::malformed(err)
    }
}

impl From<std::str::Utf8Error> for SanitizeError {
    fn from(err: std::str::Utf8Error) -> Self {
        SanitizeError::Malformed(format!("invalid UTF-8: {err}"))
    }
}

/// Errors raised while loading or validating a policy configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse policy: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid policy: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SanitizeError>;
