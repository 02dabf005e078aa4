//! Drive the `upload-guard` binary end to end.

use std::path::Path;
use std::process::{Command, Output};

fn upload_guard(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_upload-guard"))
        .args(args)
        .current_dir(dir)
        .env_remove("UPLOAD_GUARD_POLICY")
        .env("NO_COLOR", "1")
        .env("HOME", dir)
        .output()
        .unwrap()
}

#[test]
fn test_sanitize_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("logo.svg"),
        br#"<svg onload="alert(1)"><script>alert(2)</script><rect/></svg>"#,
    )
    .unwrap();

    let out = upload_guard(dir.path(), &["--quiet", "sanitize", "logo.svg"]);
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("<?xml"));
    assert!(stdout.contains("<svg><rect/></svg>"));
    assert!(!stdout.contains("alert"));
}

#[test]
fn test_sanitize_malformed_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.svg"), br#"<svg onload="alert(1)">"#).unwrap();

    let out = upload_guard(dir.path(), &["sanitize", "bad.svg", "-o", "clean.svg"]);
    assert!(!out.status.success());
    assert!(!dir.path().join("clean.svg").exists());
}

#[test]
fn test_check_json_report_and_audit_log() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ok.svg"), b"<svg/>").unwrap();
    std::fs::write(
        dir.path().join("link.svg"),
        br#"<svg><a href="javascript:x()">x</a></svg>"#,
    )
    .unwrap();

    let out = upload_guard(
        dir.path(),
        &["--json", "--audit", "check", "ok.svg", "link.svg"],
    );
    assert!(!out.status.success());

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["clean"], false);
    assert_eq!(report["files"][0]["status"], "clean");
    assert_eq!(report["files"][1]["status"], "sanitized");
    assert_eq!(
        report["files"][1]["removed"]["removed_attributes"][0]["attribute"],
        "href"
    );

    let log = dir.path().join(".upload-guard").join("audit.jsonl");
    assert_eq!(std::fs::read_to_string(log).unwrap().lines().count(), 2);
}

#[test]
fn test_policy_file_applies_to_check() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("policy.json"),
        br#"{"base": "svg", "extra_forbidden_tags": ["animate"]}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("anim.svg"), b"<svg><animate/></svg>").unwrap();

    let out = upload_guard(dir.path(), &["--quiet", "check", "anim.svg"]);
    assert!(out.status.success());

    let out = upload_guard(
        dir.path(),
        &["--quiet", "--policy", "policy.json", "check", "anim.svg"],
    );
    assert!(!out.status.success());
}

#[test]
fn test_policy_command_prints_json() {
    let dir = tempfile::tempdir().unwrap();
    let out = upload_guard(dir.path(), &["policy", "--kind", "xml", "--max-size", "100"]);
    assert!(out.status.success());
    let policy: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(policy["base"], "xml");
    assert_eq!(policy["max_size"], 100);
}
