//! CLI tests for the `agentloop` binary.
//!
//! Spawns the binary in a temp working directory so relative default paths
//! (`config/`, `memory/`, `history_index/`) resolve inside it.

use std::fs;
use std::process::Command;

use agentloop::io::config::{AgentConfig, load_config};
use agentloop::test_support::write_transcript;
use serde_json::Value;

fn agentloop(dir: &std::path::Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_agentloop"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn agentloop")
}

fn stdout_json(output: &std::process::Output) -> Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

#[test]
fn heuristics_prints_masked_text_and_verdicts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = agentloop(temp.path(), &["heuristics", "my password is hunter2"]);
    let json = stdout_json(&output);

    assert_eq!(json["text"], "my [REDACTED] is hunter2");
    let verdicts = json["verdicts"].as_array().expect("verdicts");
    assert_eq!(verdicts.len(), 10);
    let banned = verdicts
        .iter()
        .find(|verdict| verdict["id"] == "banned_words_filter")
        .expect("banned words verdict");
    assert_eq!(banned["severity"], "warn");
    assert_eq!(banned["flags"]["banned_terms_found"][0], "password");
}

#[test]
fn heuristics_honours_config_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(temp.path().join("config")).expect("mkdir");
    fs::write(
        temp.path().join("config/heuristics.toml"),
        "[[pre_query]]\nid = \"timeout_manager\"\n",
    )
    .expect("write heuristics");

    let json = stdout_json(&agentloop(temp.path(), &["heuristics", "my password"]));
    assert_eq!(json["text"], "my password");
    assert_eq!(json["verdicts"].as_array().map(Vec::len), Some(1));
}

#[test]
fn index_then_retrieve() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_transcript(
        &temp.path().join("memory/2025/03/01"),
        "s1.json",
        "capital of france",
        "FINAL_ANSWER: Paris",
    )
    .expect("transcript");

    let report = stdout_json(&agentloop(temp.path(), &["index"]));
    assert_eq!(report["pairs"], 1);
    assert_eq!(report["postings_written"], true);

    let hits = stdout_json(&agentloop(temp.path(), &["retrieve", "capital of france"]));
    assert_eq!(hits[0]["answer"], "FINAL_ANSWER: Paris");
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = agentloop(temp.path(), &["init"]);
    assert!(first.status.success());
    let config = load_config(&temp.path().join("config/agent.toml")).expect("load");
    assert_eq!(config, AgentConfig::default());

    let second = agentloop(temp.path(), &["init"]);
    assert_eq!(second.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));
}
