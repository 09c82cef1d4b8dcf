use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

const PAGE: &str = r#"<html><head><title>Catalog</title></head><body>
    <ul>
        <li class="item" data-sku="a">Alpha</li>
        <li class="item" data-sku="b">Beta</li>
    </ul>
    <input id="q" value="">
</body></html>"#;

const TASK: &str = r##"
id: catalog
output_format: csv
extract_script: |
  let rows = [];
  for el in document.querySelectorAll("li.item") {
    rows.push(#{ sku: el.attrs["data-sku"], name: el.text });
  }
  console.log(`rows ${rows.len()}`);
  rows
actions:
  - type: type
    selector: "#q"
    value: "{$query}"
  - type: foreach
    selector: li.item
    varName: item
  - type: set
    varName: last
    value: "{$loop.text}"
  - type: end
"##;

fn browserflow(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("browserflow"));
    cmd.arg("--config").arg(config).arg("--log-level").arg("warn");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn run_writes_bundle_and_csv() -> Result<()> {
    let tmp = tempdir()?;
    let config = tmp.path().join("config.yaml");
    let html = tmp.path().join("page.html");
    let task = tmp.path().join("task.yaml");
    let out_dir = tmp.path().join("out");
    fs::write(&html, PAGE)?;
    fs::write(&task, TASK)?;

    let output = browserflow(&config)
        .args(["--output", "json", "run"])
        .arg(&task)
        .arg("--html")
        .arg(&html)
        .args(["--var", "query=tea", "--run-id", "run-1", "--output-dir"])
        .arg(&out_dir)
        .assert()
        .success()
        .get_output()
        .clone();

    let bundle = stdout_json(&output);
    assert_eq!(bundle["success"], Value::Bool(true));
    assert_eq!(bundle["termination"], "completed");
    assert_eq!(bundle["variables"]["last"], "Beta");
    assert_eq!(bundle["data"][1]["sku"], "b");
    assert!(bundle["logs"]
        .as_array()
        .unwrap()
        .iter()
        .any(|line| line == "console: rows 2"));

    let csv = fs::read_to_string(out_dir.join("run-1.csv"))?;
    assert!(csv.contains("Alpha"), "{csv}");
    assert!(out_dir.join("run-1.json").exists());
    Ok(())
}

#[test]
fn failed_runs_exit_with_an_error() -> Result<()> {
    let tmp = tempdir()?;
    let config = tmp.path().join("config.yaml");
    let task = tmp.path().join("task.json");
    fs::write(&task, r#"[{"type": "stop", "value": "error"}]"#)?;

    browserflow(&config)
        .arg("run")
        .arg(&task)
        .arg("--no-save")
        .assert()
        .failure();
    Ok(())
}

#[test]
fn check_reports_structure() -> Result<()> {
    let tmp = tempdir()?;
    let config = tmp.path().join("config.yaml");
    let task = tmp.path().join("task.json");
    fs::write(
        &task,
        r#"[{"type": "repeat", "value": "2"}, {"type": "end"}, {"type": "end"}]"#,
    )?;

    let output = browserflow(&config)
        .args(["--output", "json", "check"])
        .arg(&task)
        .assert()
        .success()
        .get_output()
        .clone();
    let report = stdout_json(&output);
    assert_eq!(report["actions"], 3);
    assert_eq!(report["blocks"], 1);
    assert_eq!(report["diagnostics"][0]["kind"], "unmatched_end");

    browserflow(&config)
        .arg("check")
        .arg(&task)
        .arg("--strict")
        .assert()
        .failure();
    Ok(())
}

#[test]
fn schema_describes_actions() -> Result<()> {
    let tmp = tempdir()?;
    let output = browserflow(&tmp.path().join("config.yaml"))
        .arg("schema")
        .assert()
        .success()
        .get_output()
        .clone();
    let schema = stdout_json(&output);
    assert_eq!(schema["type"], "array");
    assert!(schema["definitions"]["ActionSpec"]["properties"]["type"].is_object());
    Ok(())
}

fn extract_titles(config: &Path, dir: &Path) -> Result<Value> {
    let html = dir.join("page.html");
    fs::write(&html, PAGE)?;
    let output = browserflow(config)
        .arg("extract")
        .arg(&html)
        .args([
            "--script",
            r#"let names = []; for el in document.querySelectorAll("li.item") { names.push(el.text); } names"#,
        ])
        .assert()
        .success()
        .get_output()
        .clone();
    Ok(stdout_json(&output))
}

#[test]
fn extract_runs_in_process() -> Result<()> {
    let tmp = tempdir()?;
    let result = extract_titles(&tmp.path().join("config.yaml"), tmp.path())?;
    assert_eq!(result, serde_json::json!(["Alpha", "Beta"]));
    Ok(())
}

#[test]
fn extract_runs_in_a_worker_process() -> Result<()> {
    let tmp = tempdir()?;
    let config = tmp.path().join("config.yaml");
    fs::write(&config, "sandbox:\n  mode: worker\n  timeout_ms: 4000\n")?;
    let result = extract_titles(&config, tmp.path())?;
    assert_eq!(result, serde_json::json!(["Alpha", "Beta"]));
    Ok(())
}

#[test]
fn config_init_and_get() -> Result<()> {
    let tmp = tempdir()?;
    let config = tmp.path().join("nested").join("config.yaml");

    browserflow(&config).args(["config", "init"]).assert().success();
    assert!(config.exists());
    browserflow(&config).args(["config", "init"]).assert().failure();

    browserflow(&config)
        .args(["config", "set", "sandbox.timeout_ms", "1500"])
        .assert()
        .success();
    let output = browserflow(&config)
        .args(["config", "get", "sandbox.timeout_ms"])
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1500");
    Ok(())
}
