//! `upload-guard sanitize`: clean a single upload.

use crate::audit::Status;
use crate::cli::output::{self, Styled};
use crate::cli::{describe_removals, process_file, KindArg, Settings};
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sanitize `input` and write the result to `output` or stdout.
///
/// Returns `false` when the document was rejected.
pub fn run(
    settings: &Settings,
    input: &Path,
    output: Option<PathBuf>,
    mime: Option<&str>,
    kind: Option<KindArg>,
) -> Result<bool> {
    if output::is_json() && output.is_none() {
        bail!("--json needs -o <output>; stdout carries the report");
    }

    let guard = settings.guard()?;
    let mut audit = settings.audit_logger()?;
    let outcome = process_file(&guard, input, kind, mime)?;

    if outcome.status == Status::Skipped {
        bail!(
            "{} is neither SVG nor XML; pass --kind svg or --kind xml",
            input.display()
        );
    }
    outcome.audit(audit.as_mut(), "sanitize")?;

    if let Some(bytes) = &outcome.output {
        match &output {
            Some(path) => std::fs::write(path, bytes)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(bytes)?;
                stdout.flush()?;
            }
        }
    }

    if output::is_json() {
        output::print_json(&outcome.to_json());
        return Ok(outcome.error.is_none());
    }
    if output::is_quiet() {
        return Ok(outcome.error.is_none());
    }

    let s = Styled::new();
    match (&outcome.error, &outcome.output) {
        (Some(e), _) => {
            eprintln!("  {} {}: {}", s.fail_sym(), outcome.file, s.red(&e.to_string()));
        }
        (None, Some(bytes)) => {
            let size = output::format_size(bytes.len() as u64);
            if outcome.report.is_clean() {
                eprintln!("  {} {} clean ({size})", s.ok_sym(), outcome.file);
            } else {
                eprintln!(
                    "  {} {} sanitized, {} removal(s) ({size})",
                    s.warn_sym(),
                    outcome.file,
                    outcome.report.removed()
                );
            }
            if output::is_verbose() {
                for line in describe_removals(&outcome.report) {
                    eprintln!("      {}", s.dim(&line));
                }
            }
        }
        (None, None) => {}
    }

    Ok(outcome.error.is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("logo.svg");
        let output = dir.path().join("clean.svg");
        let audit = dir.path().join("audit.jsonl");
        std::fs::write(&input, br#"<svg onload="x()"><rect/></svg>"#).unwrap();

        let settings = Settings {
            audit_log: Some(audit.clone()),
            ..Default::default()
        };
        assert!(run(&settings, &input, Some(output.clone()), None, None).unwrap());

        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("<rect/>"));
        assert!(!written.contains("onload"));

        let log = std::fs::read_to_string(&audit).unwrap();
        assert!(log.contains(r#""status":"sanitized""#));
    }

    #[test]
    fn test_sanitize_rejects_unknown_kind() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("photo.png");
        std::fs::write(&input, b"\x89PNG").unwrap();

        let err = run(&Settings::default(), &input, None, None, None).unwrap_err();
        assert!(err.to_string().contains("--kind"));
    }

    #[test]
    fn test_sanitize_reports_rejection() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.svg");
        let output = dir.path().join("out.svg");
        std::fs::write(&input, b"<svg><g></svg>").unwrap();

        assert!(!run(&Settings::default(), &input, Some(output.clone()), None, None).unwrap());
        assert!(!output.exists());
    }
}
