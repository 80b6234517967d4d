//! Scenario: operator CLI guardrails and dry-run scan.
//!
//! # Invariants under test
//! 1. `fw state set` refuses without `--yes` and never touches the database.
//! 2. `fw scan` reports the control-file run and candidates capped at it.
//! 3. `fw scan` on a corrupt control file reports degraded mode.
//!
//! No DB or broker required.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn state_set_requires_yes() {
    Command::cargo_bin("fw")
        .unwrap()
        .env_remove("FW_DATABASE_URL")
        .args(["state", "set", "--instrument", "MARI", "--sequence", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("REFUSING STATE SET"));
}

fn archive_with_runs(control: &str) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("NDXMARI").join("Instrument");
    let data = base.join("data").join("cycle_24_1");
    fs::create_dir_all(&data).unwrap();
    fs::create_dir_all(base.join("logs")).unwrap();
    for seq in [27005, 27006, 27007] {
        fs::write(data.join(format!("MAR{seq}.nxs")), b"").unwrap();
    }
    fs::write(base.join("logs").join("lastrun.txt"), control).unwrap();
    tmp
}

#[test]
fn scan_reports_candidates_capped_at_control_run() {
    let tmp = archive_with_runs("MAR 27006 0\n");

    Command::cargo_bin("fw")
        .unwrap()
        .env("WATCH_DIR", tmp.path())
        .env("INSTRUMENT_FOLDER", "NDXMARI")
        .env("FILE_PREFIX", "MAR")
        .env_remove("FW_INSTRUMENTS_FILE")
        .args(["scan", "--instrument", "MARI", "--files"])
        .assert()
        .success()
        .stdout(predicate::str::contains("control_sequence=27006"))
        .stdout(predicate::str::contains("candidates=2 highest=27006"))
        .stdout(predicate::str::contains("MAR27007").not());
}

#[test]
fn scan_with_corrupt_control_file_is_degraded() {
    let tmp = archive_with_runs("garbage\n");

    Command::cargo_bin("fw")
        .unwrap()
        .env("WATCH_DIR", tmp.path())
        .env("INSTRUMENT_FOLDER", "NDXMARI")
        .env("FILE_PREFIX", "MAR")
        .env_remove("FW_INSTRUMENTS_FILE")
        .args(["scan", "--instrument", "MARI"])
        .assert()
        .success()
        .stdout(predicate::str::contains("degraded=true"))
        .stdout(predicate::str::contains("control_sequence=none"))
        .stdout(predicate::str::contains("candidates=3 highest=27007"));
}
