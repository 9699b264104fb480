//! Binary-level checks that need neither a graph server nor an LLM endpoint.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const KEY_VARS: [&str; 3] = ["MEDGRAPH_LLM_API_KEY", "OPENAI_API_KEY", "DASHSCOPE_API_KEY"];

fn medgraph_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_medgraph"))
}

/// Run in `dir` with every medgraph variable cleared so only `dir/.env` applies.
fn run(dir: &Path, args: &[&str]) -> Output {
    let mut cmd = Command::new(medgraph_bin());
    cmd.args(args).current_dir(dir).env("NO_COLOR", "1");
    for var in KEY_VARS {
        cmd.env_remove(var);
    }
    for var in [
        "MEDGRAPH_LLM_BASE_URL",
        "MEDGRAPH_LLM_MODEL",
        "MEDGRAPH_LLM_TIMEOUT_SECS",
        "MEDGRAPH_LLM_MAX_RETRIES",
    ] {
        cmd.env_remove(var);
    }
    cmd.output().expect("run medgraph")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["import", "verify", "schema", "reset", "ask"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn ask_requires_a_question() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["ask"]);
    assert!(!output.status.success());
}

#[test]
fn ask_without_api_key_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["ask", "糖尿病有哪些症状？"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("No LLM API key configured"), "{err}");
}

#[test]
fn ask_rejects_zero_record_cap() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["ask", "--max-records", "0", "糖尿病有哪些症状？"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("--max-records"), "{err}");
    assert!(!err.contains("No LLM API key configured"), "{err}");
}

#[test]
fn dotenv_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(".env"),
        "OPENAI_API_KEY=sk-test\nMEDGRAPH_LLM_TIMEOUT_SECS=soon\n",
    )
    .unwrap();

    let output = run(dir.path(), &["ask", "糖尿病有哪些症状？"]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("MEDGRAPH_LLM_TIMEOUT_SECS"), "{err}");
    assert!(!err.contains("No LLM API key configured"), "{err}");
}

#[test]
fn reset_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["reset"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("--yes"));
}

#[test]
fn import_without_sources_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["import"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no sources given"));

    let output = run(dir.path(), &["import", "--data-dir", "missing"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("does not exist"));
}
