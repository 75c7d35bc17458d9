//! 命令行集成测试

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use serde_json::{json, Value};
use tempfile::TempDir;

fn write_inputs(dir: &Path, config: &Value, record: &Value) {
    fs::write(dir.join("config.json"), serde_json::to_string(config).unwrap()).unwrap();
    fs::write(dir.join("record.json"), serde_json::to_string(record).unwrap()).unwrap();
}

fn locplat() -> Command {
    let mut cmd = Command::cargo_bin("locplat").unwrap();
    cmd.env_remove("LOCPLAT_LOG_LEVEL");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_cli_translate_side_table() {
    let dir = TempDir::new().unwrap();
    write_inputs(
        dir.path(),
        &json!({"fieldPaths": ["title", "content"], "primaryCollectionName": "articles", "batchProcessing": true}),
        &json!({"id": 3, "title": "Hello", "content": "<p>Hi <strong>there</strong></p>"}),
    );

    let output = locplat()
        .current_dir(dir.path())
        .args(["--log-level", "error", "translate"])
        .args(["--config", "config.json", "--record", "record.json"])
        .args(["--source", "en", "--target", "fr"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["record"]["articles_id"], json!(3));
    assert_eq!(outcome["record"]["title"], json!("Hello_fr"));
    assert_eq!(
        outcome["record"]["content"],
        json!("<p>Hi_fr <strong>there_fr</strong></p>")
    );

    println!("✅ CLI translate passed");
}

#[test]
fn test_cli_extract_prints_batch() {
    let dir = TempDir::new().unwrap();
    write_inputs(
        dir.path(),
        &json!({"fieldPaths": ["title", "content"], "primaryCollectionName": "articles", "batchProcessing": true}),
        &json!({"title": "Hello", "content": "<p>Hi <strong>there</strong></p>"}),
    );

    let output = locplat()
        .current_dir(dir.path())
        .args(["extract", "--config", "config.json", "--record", "record.json", "--locale", "fr"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let result = stdout_json(&output);
    assert_eq!(result["__batch__"]["texts"], json!(["Hello"]));
    assert_eq!(result["fields"]["content"]["type"], json!("markup"));

    println!("✅ CLI extract passed");
}

#[test]
fn test_cli_validate_rejects_bad_paths() {
    let dir = TempDir::new().unwrap();
    write_inputs(
        dir.path(),
        &json!({"fieldPaths": ["title", "items[x].name"], "pattern": "perLocaleCollection"}),
        &json!({}),
    );

    let output = locplat()
        .current_dir(dir.path())
        .args(["validate", "--config", "config.json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report = stdout_json(&output);
    assert_eq!(report["valid"], json!(false));

    println!("✅ CLI validate passed");
}

#[test]
fn test_cli_missing_file_exits_with_error() {
    let dir = TempDir::new().unwrap();

    let output = locplat()
        .current_dir(dir.path())
        .args(["preview", "--config", "missing.json", "--record", "record.json", "--locale", "ar"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(!output.stderr.is_empty());

    println!("✅ CLI missing file passed");
}
