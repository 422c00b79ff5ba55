//! Integration tests for the dzreg command line
//!
//! Each test writes a configuration to a temporary directory and runs the
//! compiled binary against it.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const CONFIG: &str = r#"
application_qualifier = "datazone"

[deployment]
account_id = "991651053978"
region = "eu-west-1"

[domain]
name = "corp-domain"
account_id = "123456789012"
region = "eu-west-1"
project_name = "analytics"

[producer]
account_id = "991651053978"
deploy_role = "cdk-hnb659fds-cfn-exec-role-991651053978-eu-west-1"

[[datasets]]
name = "testdata"
registration = true
schedule = "cron(0 1 * * ? *)"
bucket = { kind = "managed" }
"#;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("dzreg.toml");
    std::fs::write(&path, contents).expect("Failed to write config");
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dzreg"))
        .args(args)
        .env_remove("DZREG_CONFIG")
        .output()
        .expect("Failed to run dzreg")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp path is not UTF-8")
}

#[test]
fn test_synth_writes_valid_template() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);
    let output_path = dir.path().join("template.json");

    let output = run(&[
        "synth",
        "--config",
        path_arg(&config),
        "--output",
        path_arg(&output_path),
    ]);
    assert!(
        output.status.success(),
        "synth failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let template: Value =
        serde_json::from_str(&std::fs::read_to_string(&output_path).unwrap()).unwrap();
    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    let crawler = &template["Resources"]["TestdataGlueCrawler"];
    assert_eq!(crawler["Properties"]["Name"], "datazone-testdata-data-crawler");
    assert_eq!(crawler["Properties"]["Tags"]["dzRegistration"], "true");
}

#[test]
fn test_synth_to_stdout() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);

    let output = run(&["--quiet", "synth", "--config", path_arg(&config)]);
    assert!(output.status.success());
    let template: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(template["Resources"]["TestdataGlueDatabase"].is_object());
}

#[test]
fn test_config_from_environment() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);

    let output = Command::new(env!("CARGO_BIN_EXE_dzreg"))
        .args(["-q", "check"])
        .env("DZREG_CONFIG", &config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Configuration OK"), "{}", stdout);
}

#[test]
fn test_plan_lists_table_grant_after_its_dependencies() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);

    let output = run(&["-q", "plan", "--config", path_arg(&config)]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ids: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split('\t').next())
        .collect();
    let position = |id: &str| ids.iter().position(|candidate| *candidate == id).unwrap();

    let grant = position("TestdataGlueCrawlerTablePermissions");
    assert!(grant > position("TestdataGlueCrawler"));
    assert!(grant > position("TestdataGlueCrawlerRole"));
    assert!(grant > position("TestdataGlueDatabase"));

    let crawler_line = stdout
        .lines()
        .find(|line| line.starts_with("TestdataGlueCrawler\t"))
        .unwrap();
    assert_eq!(crawler_line, "TestdataGlueCrawler\tprocessing\tAWS::Glue::Crawler");
}

#[test]
fn test_check_reports_wildcard_grants() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);

    let output = run(&["check", "--config", path_arg(&config)]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("lakeformation:GetDataAccess"), "{}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, &CONFIG.replace("cron(0 1 * * ? *)", "daily"));

    let output = run(&["check", "--config", path_arg(&config)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("testdata"), "{}", stderr);
}

#[test]
fn test_missing_config_file_fails() {
    let output = run(&["plan", "--config", "/nonexistent/dzreg.toml"]);
    assert!(!output.status.success());
}

#[test]
fn test_diagnostics_stay_off_stdout() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, CONFIG);

    let output = run(&["-vv", "synth", "--config", path_arg(&config)]);
    assert!(output.status.success());
    let template: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(template["Resources"].is_object());
    assert!(!output.stderr.is_empty());
}
