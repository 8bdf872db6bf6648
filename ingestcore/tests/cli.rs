//! CLI smoke tests (§6.5) driving the `ingestd` binary as a subprocess, the
//! way a human operator would invoke it.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_every_operational_subcommand() {
    Command::cargo_bin("ingestd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("start-worker"))
        .stdout(predicate::str::contains("start-beat"))
        .stdout(predicate::str::contains("reprocess-incidents"))
        .stdout(predicate::str::contains("backfill-merge-info"));
}

#[test]
fn reprocess_incidents_without_since_is_a_usage_error() {
    Command::cargo_bin("ingestd")
        .unwrap()
        .arg("reprocess-incidents")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--since"));
}

#[test]
fn backfill_merge_info_dry_run_reports_without_mutating() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("ingest.sqlite3");

    Command::cargo_bin("ingestd")
        .unwrap()
        .env("DATABASE_URL", format!("sqlite://{}", db_path.display()))
        .arg("backfill-merge-info")
        .assert()
        .success()
        .stdout(predicate::str::contains("dry run"));
}

#[test]
fn unknown_subcommand_is_rejected_by_clap() {
    Command::cargo_bin("ingestd")
        .unwrap()
        .arg("not-a-real-command")
        .assert()
        .failure();
}
