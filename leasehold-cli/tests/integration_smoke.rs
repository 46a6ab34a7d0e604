//! Smoke tests to verify command wiring against a throwaway database

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn leasehold(db: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("leasehold").unwrap();
    cmd.env_remove("RUST_LOG").arg("--database-url").arg(format!(
        "sqlite://{}",
        db.path().join("smoke.db").display()
    ));
    cmd
}

// === Help Output ===

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("leasehold").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("seed-demo"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("monitor"));
}

#[test]
fn test_search_help() {
    let mut cmd = Command::cargo_bin("leasehold").unwrap();
    cmd.arg("search").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("four or more"));
}

// === Catalog Commands ===

#[test]
fn test_init_creates_schema() {
    let db = TempDir::new().unwrap();
    leasehold(&db)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("schema ready"));
    assert!(db.path().join("smoke.db").exists());
}

#[test]
fn test_seed_then_search() {
    let db = TempDir::new().unwrap();
    leasehold(&db)
        .arg("seed-demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"listings_created\": 5"));

    // Second run reuses everything
    leasehold(&db)
        .arg("seed-demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"listings_created\": 0"));

    leasehold(&db)
        .args(["search", "--location", "downtown", "--bedrooms", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Downtown Penthouse"))
        .stdout(predicate::str::contains("Sunny Downtown Loft").not());

    leasehold(&db)
        .args(["featured", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Downtown Penthouse"))
        .stdout(predicate::str::contains("Family House").not());
}

#[test]
fn test_show_missing_property_fails() {
    let db = TempDir::new().unwrap();
    leasehold(&db)
        .args(["show", "no-such-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_bad_config_file_is_reported() {
    let db = TempDir::new().unwrap();
    let config = db.path().join("leasehold.toml");
    std::fs::write(&config, "[pool]\nmax_size = 0\n").unwrap();

    leasehold(&db)
        .arg("--config")
        .arg(&config)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_size"));
}
