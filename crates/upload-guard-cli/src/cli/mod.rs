//! CLI subcommand implementations for the upload-guard binary.

pub mod check_cmd;
pub mod output;
pub mod policy_cmd;
pub mod sanitize_cmd;

use crate::audit::{AuditLogger, Status};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::time::Instant;
use upload_guard::{
    Policy, PolicyBase, PolicyConfig, Report, SanitizeError, UploadGuard, UploadKind,
};

/// Environment variable naming a policy file when `--policy` is absent.
pub const POLICY_ENV: &str = "UPLOAD_GUARD_POLICY";

/// Document kind selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Svg,
    Xml,
}

impl From<KindArg> for UploadKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Svg => UploadKind::Svg,
            KindArg::Xml => UploadKind::Xml,
        }
    }
}

impl From<KindArg> for PolicyBase {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Svg => PolicyBase::Svg,
            KindArg::Xml => PolicyBase::Xml,
        }
    }
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub policy: Option<PathBuf>,
    pub max_size: Option<usize>,
    pub audit: bool,
    pub audit_log: Option<PathBuf>,
}

impl Settings {
    /// Policy file from the flag, falling back to the environment.
    pub fn policy_path(&self) -> Option<PathBuf> {
        self.policy
            .clone()
            .or_else(|| std::env::var_os(POLICY_ENV).map(PathBuf::from))
    }

    pub fn policy_config(&self) -> Result<PolicyConfig> {
        match self.policy_path() {
            Some(path) => PolicyConfig::load(&path)
                .with_context(|| format!("failed to load policy {}", path.display())),
            None => Ok(PolicyConfig::default()),
        }
    }

    /// Effective policy for one document kind.
    ///
    /// `root_tags` in the file only applies to the base it was written for.
    pub fn policy(&self, base: PolicyBase) -> Result<Policy> {
        let mut config = self.policy_config()?;
        if config.base != base {
            config.root_tags = None;
        }
        config.base = base;
        if self.max_size.is_some() {
            config.max_size = self.max_size;
        }
        Policy::from_config(&config).context("invalid policy")
    }

    pub fn guard(&self) -> Result<UploadGuard> {
        Ok(UploadGuard::new(
            self.policy(PolicyBase::Svg)?,
            self.policy(PolicyBase::Xml)?,
        ))
    }

    pub fn audit_logger(&self) -> Result<Option<AuditLogger>> {
        match (&self.audit_log, self.audit) {
            (Some(path), _) => AuditLogger::open(path).map(Some),
            (None, true) => AuditLogger::default_logger().map(Some),
            (None, false) => Ok(None),
        }
    }
}

/// Result of running one file through the guard.
#[derive(Debug)]
pub struct FileOutcome {
    pub file: String,
    pub kind: UploadKind,
    pub status: Status,
    pub output: Option<Vec<u8>>,
    pub report: Report,
    pub error: Option<SanitizeError>,
    pub duration_ms: u64,
}

impl FileOutcome {
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(|e| e.kind().as_str())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "file": self.file,
            "kind": self.kind,
            "status": self.status,
            "error_kind": self.error_kind(),
            "error": self.error.as_ref().map(|e| e.to_string()),
            "removed": self.report,
            "duration_ms": self.duration_ms,
        })
    }

    /// Record this outcome in the audit log, if one is open.
    pub fn audit(&self, logger: Option<&mut AuditLogger>, command: &str) -> Result<()> {
        if let Some(logger) = logger {
            logger.log_outcome(
                command,
                &self.file,
                self.kind.as_str(),
                self.status,
                self.error_kind(),
                self.report.removed(),
                self.duration_ms,
            )?;
        }
        Ok(())
    }
}

/// Read and sanitize one file. I/O failures are errors; sanitizer
/// rejections are outcomes.
pub fn process_file(
    guard: &UploadGuard,
    path: &Path,
    kind: Option<KindArg>,
    mime: Option<&str>,
) -> Result<FileOutcome> {
    let content =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file = path.display().to_string();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let kind = kind
        .map(UploadKind::from)
        .unwrap_or_else(|| UploadKind::detect(mime, &filename));

    let start = Instant::now();
    let processed = guard.process_as(kind, &filename, &content);
    let duration_ms = start.elapsed().as_millis() as u64;

    let outcome = match processed {
        Ok(upload) if upload.kind == UploadKind::Other => FileOutcome {
            file,
            kind,
            status: Status::Skipped,
            output: None,
            report: upload.report,
            error: None,
            duration_ms,
        },
        Ok(upload) => FileOutcome {
            file,
            kind,
            status: if upload.report.is_clean() {
                Status::Clean
            } else {
                Status::Sanitized
            },
            output: Some(upload.content.into_owned()),
            report: upload.report,
            error: None,
            duration_ms,
        },
        Err(e) => FileOutcome {
            file,
            kind,
            status: Status::Rejected,
            output: None,
            report: Report::default(),
            error: Some(e),
            duration_ms,
        },
    };
    Ok(outcome)
}

/// One human-readable line per removal, for verbose output.
pub fn describe_removals(report: &Report) -> Vec<String> {
    let elements = report
        .removed_elements
        .iter()
        .map(|r| format!("removed <{}> ({:?})", r.element, r.reason));
    let attributes = report
        .removed_attributes
        .iter()
        .map(|r| format!("removed {} on <{}> ({:?})", r.attribute, r.element, r.reason));
    elements.chain(attributes).collect()
}
