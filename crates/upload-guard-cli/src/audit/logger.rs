//! JSONL audit logger: append-only record of every sanitization decision.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Final state of one processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Accepted with nothing removed.
    Clean,
    /// Accepted after removals.
    Sanitized,
    Rejected,
    /// Not an SVG or XML document.
    Skipped,
}

/// A single audit event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub command: String,
    pub file: String,
    pub kind: String,
    pub status: Status,
    pub error_kind: Option<String>,
    pub removed: usize,
    pub duration_ms: u64,
}

/// Append-only JSONL audit logger.
pub struct AuditLogger {
    file: File,
}

impl AuditLogger {
    /// Open or create the audit log file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log: {}", path.display()))?;

        Ok(Self { file })
    }

    /// Default audit log location, ~/.upload-guard/audit.jsonl.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".upload-guard")
            .join("audit.jsonl")
    }

    /// Open the default audit log.
    pub fn default_logger() -> Result<Self> {
        Self::open(&Self::default_path())
    }

    /// Log an audit event.
    pub fn log(&mut self, event: &AuditEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        writeln!(self.file, "{json}")?;
        Ok(())
    }

    /// Log the outcome of processing one file.
    #[allow(clippy::too_many_arguments)]
    pub fn log_outcome(
        &mut self,
        command: &str,
        file: &str,
        kind: &str,
        status: Status,
        error_kind: Option<&str>,
        removed: usize,
        duration_ms: u64,
    ) -> Result<()> {
        self.log(&AuditEvent {
            timestamp: Utc::now().to_rfc3339(),
            command: command.to_string(),
            file: file.to_string(),
            kind: kind.to_string(),
            status,
            error_kind: error_kind.map(String::from),
            removed,
            duration_ms,
        })
    }
}
