#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("legacy")).unwrap();
    fs::create_dir_all(tmp.path().join("migrated")).unwrap();
    fs::write(tmp.path().join("legacy/A.java"), "class A {}\n").unwrap();
    fs::write(tmp.path().join("migrated/B.java"), "class B {}\n").unwrap();
    fs::write(
        tmp.path().join("mapping.json"),
        r#"{"version": 1, "entries": [{"source": "A.java", "target": "B.java"}]}"#,
    )
    .unwrap();
    fs::write(tmp.path().join("migrafix.json"), "{}").unwrap();
    tmp
}

fn migrafix(cwd: &Path, args: &[&str]) -> Output {
    // `cargo test` sets this for integration tests.
    let bin = env!("CARGO_BIN_EXE_migrafix");
    Command::new(bin)
        .current_dir(cwd)
        .env_remove("OPENAI_API_KEY")
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(cwd.join("migrafix.json"))
        .args(args)
        .output()
        .expect("spawn migrafix")
}

fn run_args<'a>(build_cmd: &'a str, extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec![
        "run",
        "--legacy",
        "legacy",
        "--migrated",
        "migrated",
        "--map",
        "mapping.json",
        "--build-cmd",
        build_cmd,
    ];
    args.extend_from_slice(extra);
    args
}

#[test]
fn passing_build_exits_zero() {
    let tmp = workspace();
    let out = migrafix(tmp.path(), &run_args("echo BUILD SUCCESSFUL", &["--json"]));
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["status"], "success");
    assert_eq!(report["retry_attempts"], 0);
}

#[test]
fn unrepairable_build_exits_two() {
    let tmp = workspace();
    let out = migrafix(
        tmp.path(),
        &run_args("echo B.java:3: error: cannot find symbol", &["--max-retries", "1"]),
    );
    assert_eq!(out.status.code(), Some(2), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("status: failed_after_retries"));
    assert!(stdout.contains("retry_attempts: 1"));

    // The oracle was unreachable, so every attempt was logged as failed.
    let log = tmp.path().join(".migrafix/fix_history/B.java.json");
    let entries: serde_json::Value = serde_json::from_str(&fs::read_to_string(log).unwrap()).unwrap();
    let agents: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["agent"].as_str().unwrap())
        .collect();
    assert_eq!(agents, vec!["fix", "completion"]);
}

#[test]
fn bad_mapping_is_a_configuration_error() {
    let tmp = workspace();
    fs::write(tmp.path().join("mapping.json"), r#"[{"source": "A.java", "target": "B.java"}]"#).unwrap();
    let out = migrafix(tmp.path(), &run_args("echo BUILD SUCCESSFUL", &[]));
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn history_and_normalize_subcommands() {
    let tmp = workspace();
    let out = migrafix(tmp.path(), &["history", "--log-dir", "logs", "B.java"]);
    assert_eq!(out.status.code(), Some(0));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["attempts"], 0);

    fs::create_dir_all(tmp.path().join("migrated/src/main/java/web")).unwrap();
    fs::write(tmp.path().join("migrated/src/main/java/web/Ctl.java"), "class Ctl {}\n").unwrap();
    let out = migrafix(tmp.path(), &["normalize", "--migrated", "migrated", "--base-package", "com.acme"]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(
        fs::read_to_string(tmp.path().join("migrated/src/main/java/web/Ctl.java")).unwrap(),
        "package com.acme.web;\n\nclass Ctl {}\n"
    );
}

#[test]
fn stitch_subcommand_merges_fragments() {
    let tmp = workspace();
    fs::write(
        tmp.path().join("migrated/B1.java"),
        "import java.util.List;\n\npublic class B {\n    public int one() { return 1; }\n}\n",
    )
    .unwrap();
    fs::write(
        tmp.path().join("migrated/B2.java"),
        "import java.util.List;\nimport java.util.Map;\n\npublic class B2 {\n    public int one() { return 0; }\n\n    public int two() { return 2; }\n}\n",
    )
    .unwrap();

    let out = migrafix(
        tmp.path(),
        &["stitch", "--migrated", "migrated", "--target", "out/B.java", "B1.java", "B2.java", "Gone.java"],
    );
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["members"], 2);
    assert_eq!(summary["missing"], serde_json::json!(["Gone.java"]));
    assert_eq!(
        fs::read_to_string(tmp.path().join("migrated/out/B.java")).unwrap(),
        "import java.util.List;\nimport java.util.Map;\n\npublic class B {\n    public int one() { return 1; }\n\n    public int two() { return 2; }\n}\n"
    );

    let out = migrafix(tmp.path(), &["stitch", "--migrated", "migrated", "--target", "X.java", "Gone.java"]);
    assert_eq!(out.status.code(), Some(1));
}
