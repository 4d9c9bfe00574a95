//! End-to-end runs of the binary that need neither the network nor a database.

use std::path::Path;
use std::process::{Command, Output};

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_market-warehouse"))
        .args(args)
        .arg("--config")
        .arg(dir.join("missing.toml"))
        .env("MW_LAKE__BASE_DIR", dir.join("lake"))
        .env_remove("MW_WAREHOUSE__DATABASE_URL")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

#[test]
fn test_lake_status_of_empty_lake() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["lake-status"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No tables found."), "{stdout}");
}

#[test]
fn test_dry_run_load_of_empty_lake_fails_on_missing_tables() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(
        dir.path(),
        &["load", "--dry-run", "--snapshot-date", "2025-01-15"],
    );
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lake table markets unreadable"), "{stdout}");
    assert!(stdout.contains("fact_market_metrics"), "{stdout}");
    assert!(stdout.contains("skipped"), "{stdout}");
}

#[test]
fn test_database_commands_require_url() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(dir.path(), &["validate"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_market-warehouse"))
        .args(["lake-status"])
        .env("MW_EXTRACTION__PAGE_LIMIT", "0")
        .env("MW_LAKE__BASE_DIR", dir.path())
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}
