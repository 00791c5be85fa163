// Integration tests for the `modload` binary.
//
// Exercises argument handling, output formats and exit codes:
// 0 for a clean load, 1 for a failed load, 2 for I/O or config failures.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn modload_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_modload"))
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn demo_mod() -> PathBuf {
    project_root().join("demos/cis")
}

fn run(args: &[&str], dir: &Path) -> Output {
    Command::new(modload_binary())
        .args(args)
        .arg(dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run modload")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn demo_mod_prints_tree() {
    let output = run(&[], &demo_mod());
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.starts_with("mod.cis\n"), "{out}");
    assert!(out.contains("\n      cis.panel.keys\n"), "{out}");
    assert!(stderr(&output).contains("loaded mod 'cis'"));
}

#[test]
fn emit_json_is_valid() {
    let output = run(&["--emit", "json"], &demo_mod());
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("valid JSON");
    assert_eq!(doc["mod"], "cis");
    assert_eq!(doc["ok"], true);
    assert_eq!(doc["passes"], 2);
    assert!(doc["diagnostics"].as_array().unwrap().is_empty());
}

#[test]
fn only_filter_limits_block_types() {
    let output = run(&["--only", "query", "--emit", "json"], &demo_mod());
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let children = doc["tree"]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["resource"]["full_name"], "cis.query.access_key_age");
}

#[test]
fn var_overrides_default() {
    let output = run(&["--var", "region=eu-west-2", "--emit", "json"], &demo_mod());
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let region = doc["tree"]["children"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["resource"]["full_name"] == "cis.var.region")
        .expect("region variable");
    assert_eq!(region["resource"]["value"], "eu-west-2");
}

#[test]
fn failed_load_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.sp"), "locals {\n  a = local.b\n}\n").unwrap();
    let output = run(&["--emit", "diagnostics"], dir.path());
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("error[E0400]: Failed to resolve dependencies for local.local.a"), "{err}");
    assert!(err.contains("--> main.sp:2:7"), "{err}");
    assert!(stdout(&output).is_empty());
}

#[test]
fn missing_directory_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&[], &dir.path().join("absent"));
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("is not a directory"));
}

#[test]
fn malformed_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[load\n").unwrap();
    let config = config.to_string_lossy().into_owned();
    let output = run(&["--config", &config], &demo_mod());
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("failed to parse"));
}

#[test]
fn var_file_values_are_used() {
    let dir = tempfile::tempdir().unwrap();
    let vars = dir.path().join("vars.toml");
    fs::write(&vars, "max_key_age = 30\n").unwrap();
    let vars = vars.to_string_lossy().into_owned();
    let output = run(&["--var-file", &vars, "--emit", "json"], &demo_mod());
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let doc: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let control = doc["tree"]["children"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["resource"]["full_name"] == "cis.control.cis_1_4")
        .expect("control");
    assert_eq!(control["resource"]["args"]["max_age"], "30");
}
