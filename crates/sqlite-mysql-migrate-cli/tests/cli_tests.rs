//! CLI integration tests for sqlite-mysql-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! script generation and exit codes for error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::{Read, Write};
use std::path::PathBuf;
use tempfile::TempDir;

/// Get a command for the sqlite-mysql-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("sqlite-mysql-migrate").unwrap()
}

fn sample_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("shop.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE customer (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
         CREATE TABLE orders (
             id INTEGER PRIMARY KEY,
             customer_id INTEGER NOT NULL REFERENCES customer(id),
             total REAL
         );
         INSERT INTO customer (id, name) VALUES (1, 'Ann'), (2, 'Bob');
         INSERT INTO orders (id, customer_id, total) VALUES (1, 1, 9.5), (2, 2, 3.25), (3, 1, 1.0);",
    )
    .unwrap();
    path
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("--log-format"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--no-drop"))
        .stdout(predicate::str::contains("--export-mode"))
        .stdout(predicate::str::contains("--max-blob-size"))
        .stdout(predicate::str::contains("--mysql-version"))
        .stdout(predicate::str::contains("--workers"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlite-mysql-migrate"));
}

#[test]
fn test_run_requires_database() {
    cmd().arg("run").assert().failure();
}

#[test]
fn test_invalid_export_mode_rejected() {
    cmd()
        .args(["run", "db.sqlite", "--export-mode", "everything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// =============================================================================
// Script Generation Tests
// =============================================================================

#[test]
fn test_run_writes_default_output() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);

    cmd()
        .args(["run", db.to_str().unwrap(), "--batch-size", "2", "--verify-data"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Migration script generated!"))
        .stdout(predicate::str::contains("Rows: 5"));

    let script = std::fs::read_to_string(dir.path().join("shop_mysql.sql")).unwrap();
    let customer = script.find("CREATE TABLE `customer`").unwrap();
    let orders = script.find("CREATE TABLE `orders`").unwrap();
    assert!(customer < orders);
    assert_eq!(script.matches("INSERT INTO `orders`").count(), 2);
    assert!(script.contains("-- Migration report"));
}

#[test]
fn test_run_to_stdout() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);

    cmd()
        .args(["run", db.to_str().unwrap(), "-", "--export-mode", "structure"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("-- SQLite to MySQL migration script"))
        .stdout(predicate::str::contains("CREATE TABLE `orders`"))
        .stdout(predicate::str::contains("INSERT INTO").not());
}

#[test]
fn test_run_compressed_output() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);

    cmd()
        .args(["run", db.to_str().unwrap(), "--compress"])
        .assert()
        .success();

    let file = std::fs::File::open(dir.path().join("shop_mysql.sql.gz")).unwrap();
    let mut script = String::new();
    flate2::read::GzDecoder::new(file)
        .read_to_string(&mut script)
        .unwrap();
    assert!(script.contains("INSERT INTO `customer`"));
}

#[test]
fn test_output_json() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);
    let out = dir.path().join("out.sql");

    cmd()
        .args([
            "--output-json",
            "run",
            db.to_str().unwrap(),
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rows_emitted\": 5"))
        .stdout(predicate::str::contains("\"run_id\""));
    assert!(out.exists());
}

#[test]
fn test_plan_lists_order() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);

    cmd()
        .args(["plan", db.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Table order (2):"))
        .stdout(predicate::str::contains("customer (level 0, 2 rows)"))
        .stdout(predicate::str::contains("orders (level 1, 3 rows)"));
    assert!(!dir.path().join("shop_mysql.sql").exists());
}

#[test]
fn test_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);

    cmd()
        .args(["run", db.to_str().unwrap(), "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Table order"));
    assert!(!dir.path().join("shop_mysql.sql").exists());
}

#[test]
fn test_config_file_is_applied() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);
    let config_path = dir.path().join("config.yaml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(
        file,
        "source:\n  path: ignored.db\nmigration:\n  engine: MyISAM\n  drop_tables: false"
    )
    .unwrap();

    cmd()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "run",
            db.to_str().unwrap(),
            "-",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("ENGINE=MyISAM"))
        .stdout(predicate::str::contains("DROP TABLE").not());
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);

    cmd()
        .args(["--config", "/nonexistent/config.yaml", "run", db.to_str().unwrap()])
        .assert()
        .failure()
        .code(5);
}

#[test]
fn test_invalid_engine_is_config_error() {
    let dir = TempDir::new().unwrap();
    let db = sample_db(&dir);

    cmd()
        .args(["run", db.to_str().unwrap(), "--engine", "Aria"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("migration.engine"));
}

#[test]
fn test_missing_database_is_source_error() {
    let dir = TempDir::new().unwrap();

    cmd()
        .args(["run", dir.path().join("missing.db").to_str().unwrap()])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn test_dangling_foreign_key_exit_code() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE orphan (id INTEGER PRIMARY KEY, ghost_id INTEGER REFERENCES ghost(id));",
    )
    .unwrap();
    drop(conn);

    cmd()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(3);

    let script = std::fs::read_to_string(dir.path().join("broken_mysql.sql")).unwrap();
    assert!(script.contains("-- Errors (1)"));
}
