//! `upload-guard check`: report what sanitizing would change, without writing.

use crate::audit::Status;
use crate::cli::output::{self, Styled};
use crate::cli::{describe_removals, process_file, FileOutcome, KindArg, Settings};
use anyhow::Result;
use std::path::PathBuf;

/// Check every input. Returns `true` only when all of them are already clean.
pub fn run(settings: &Settings, inputs: &[PathBuf], kind: Option<KindArg>) -> Result<bool> {
    let guard = settings.guard()?;
    let mut audit = settings.audit_logger()?;

    let mut outcomes = Vec::with_capacity(inputs.len());
    for input in inputs {
        let outcome = process_file(&guard, input, kind, None)?;
        outcome.audit(audit.as_mut(), "check")?;
        outcomes.push(outcome);
    }

    let all_clean = outcomes
        .iter()
        .all(|o| matches!(o.status, Status::Clean | Status::Skipped));

    if output::is_json() {
        let files: Vec<serde_json::Value> = outcomes.iter().map(FileOutcome::to_json).collect();
        output::print_json(&serde_json::json!({
            "clean": all_clean,
            "files": files,
        }));
        return Ok(all_clean);
    }
    if output::is_quiet() {
        return Ok(all_clean);
    }

    let s = Styled::new();
    output::print_header(&s);
    for outcome in &outcomes {
        print_outcome(&s, outcome);
    }

    let rejected = count(&outcomes, Status::Rejected);
    let sanitized = count(&outcomes, Status::Sanitized);
    let summary = format!(
        "{} file(s), {sanitized} need changes, {rejected} rejected",
        outcomes.len()
    );
    if all_clean {
        output::print_status(&s, &s.green("clean"), &summary);
    } else if rejected > 0 {
        output::print_status(&s, &s.red("rejected"), &summary);
    } else {
        output::print_status(&s, &s.yellow("needs sanitizing"), &summary);
    }

    Ok(all_clean)
}

fn count(outcomes: &[FileOutcome], status: Status) -> usize {
    outcomes.iter().filter(|o| o.status == status).count()
}

fn print_outcome(s: &Styled, outcome: &FileOutcome) {
    match outcome.status {
        Status::Clean => output::print_check(s.ok_sym(), &outcome.file, "clean"),
        Status::Skipped => output::print_check(s.info_sym(), &outcome.file, "not svg/xml"),
        Status::Sanitized => {
            let value = format!("{} removal(s)", outcome.report.removed());
            output::print_check(s.warn_sym(), &outcome.file, &value);
            if output::is_verbose() {
                for line in describe_removals(&outcome.report) {
                    output::print_detail(&s.dim(&line));
                }
            }
        }
        Status::Rejected => {
            let value = outcome.error_kind().unwrap_or("rejected");
            output::print_check(s.fail_sym(), &outcome.file, value);
            if let Some(e) = &outcome.error {
                output::print_detail(&s.dim(&e.to_string()));
            }
        }
    }
}
