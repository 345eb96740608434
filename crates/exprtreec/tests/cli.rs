//! End-to-end tests for the exprtreec binary.
//!
//! Each test runs the built binary inside a scratch directory so that no
//! stray exprtree.toml is picked up.

use std::path::Path;
use std::process::{Command, Output};

// ── Helpers ────────────────────────────────────────────────────────────

fn exprtreec(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_exprtreec"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to invoke exprtreec")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "exprtreec failed:\nstdout: {}\nstderr: {}",
        stdout(output),
        stderr(output)
    );
}

// ── Tests ──────────────────────────────────────────────────────────────

/// Every sample graph behaves the same after a round trip.
#[test]
fn demo_runs_all_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let output = exprtreec(dir.path(), &["demo"]);
    assert_success(&output);
    let out = stdout(&output);
    for name in ["a", "b", "c", "d"] {
        assert!(out.contains(&format!("scenario {}:", name)), "{}", out);
    }
    assert!(out.contains("[ok]"));
    assert!(!out.contains("MISMATCH"));
}

/// A file written by `encode` is accepted by `decode --eval`.
#[test]
fn encode_then_decode_block_scenario() {
    let dir = tempfile::tempdir().unwrap();
    assert_success(&exprtreec(dir.path(), &["encode", "c", "-o", "c.json"]));
    assert!(dir.path().join("c.json").exists());

    let output = exprtreec(dir.path(), &["decode", "c.json", "--eval"]);
    assert_success(&output);
    assert!(stdout(&output).contains("() -> 10"), "{}", stdout(&output));
}

/// Lambdas with parameters are evaluated against the matching sample inputs.
#[test]
fn decode_evaluates_conditional_scenario() {
    let dir = tempfile::tempdir().unwrap();
    assert_success(&exprtreec(dir.path(), &["encode", "a", "--output", "a.json"]));

    let output = exprtreec(dir.path(), &["decode", "a.json", "--eval"]);
    assert_success(&output);
    let out = stdout(&output);
    assert!(out.contains("-> A\n"), "{}", out);
    assert!(out.contains("-> b\n"), "{}", out);
}

/// `[output] pretty = true` indents the JSON.
#[test]
fn config_controls_pretty_output() {
    let dir = tempfile::tempdir().unwrap();
    let compact = stdout(&exprtreec(dir.path(), &["encode", "d"]));
    assert_eq!(compact.trim_end().lines().count(), 1);

    std::fs::write(dir.path().join("exprtree.toml"), "[output]\npretty = true\n").unwrap();
    let pretty = stdout(&exprtreec(dir.path(), &["encode", "d"]));
    assert!(pretty.lines().count() > 1);
    assert!(pretty.contains("\n  \"kind\": \"Lambda\""), "{}", pretty);
}

#[test]
fn unknown_scenario_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = exprtreec(dir.path(), &["encode", "z"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("error: unknown scenario 'z'"), "{}", stderr(&output));
}

#[test]
fn malformed_json_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.json"), "{\"kind\": \"Nope\"}").unwrap();
    let output = exprtreec(dir.path(), &["decode", "bad.json"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("malformed portable tree"), "{}", stderr(&output));
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = exprtreec(dir.path(), &["--config", "absent.toml", "demo"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("error: Failed to read"), "{}", stderr(&output));
}
