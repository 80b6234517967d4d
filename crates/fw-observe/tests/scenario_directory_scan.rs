//! Scenario: Directory scan produces ordered candidates
//!
//! # Invariants under test
//!
//! 1. Candidates are ordered by sequence number, not by name or mtime.
//! 2. Files in cycle sub-folders are found; foreign files and directories
//!    are ignored.
//! 3. Candidates never exceed the control file's run number.
//! 4. A corrupt control file surfaces as `ControlFileCorrupt` while the
//!    listing alone still works (degraded mode).
//! 5. A missing watched directory surfaces as `DirectoryUnavailable`.
//! 6. Duplicate sequence numbers collapse to the latest cycle folder.

use std::fs;
use std::path::Path;

use fw_observe::{DirectoryObserver, ObserveError};
use fw_schemas::Instrument;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn instrument(root: &Path) -> Instrument {
    Instrument {
        id: "MARI".to_string(),
        watch_dir: root.join("NDXMARI/Instrument/data"),
        control_file: root.join("NDXMARI/Instrument/logs/lastrun.txt"),
        file_prefix: "MAR".to_string(),
        file_extension: "nxs".to_string(),
        destination: "watched-files".to_string(),
    }
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"nexus").unwrap();
}

fn write_control(inst: &Instrument, content: &str) {
    fs::create_dir_all(inst.control_file.parent().unwrap()).unwrap();
    fs::write(&inst.control_file, content).unwrap();
}

// ---------------------------------------------------------------------------
// 1-3. Ordered, filtered, capped
// ---------------------------------------------------------------------------

#[test]
fn scan_orders_filters_and_caps_at_control_sequence() {
    let tmp = tempfile::tempdir().unwrap();
    let inst = instrument(tmp.path());
    let data = &inst.watch_dir;

    touch(&data.join("cycle_23_2/MAR00010.nxs"));
    touch(&data.join("cycle_23_1/MAR00009.nxs"));
    touch(&data.join("cycle_23_2/MAR00011.nxs"));
    touch(&data.join("cycle_23_2/MAR00012.nxs")); // beyond control file
    touch(&data.join("cycle_23_2/MAR00011.log"));
    touch(&data.join("cycle_23_2/LOQ00011.nxs"));
    fs::create_dir_all(data.join("cycle_23_2/MAR00013.nxs")).unwrap();
    write_control(&inst, "MARI 00011 0\n");

    let report = DirectoryObserver::default().scan(&inst).unwrap();

    let seqs: Vec<i64> = report.candidates.iter().map(|r| r.sequence).collect();
    assert_eq!(seqs, vec![9, 10, 11]);
    assert_eq!(report.control_sequence, Some(11));
    assert_eq!(report.listed, 4);
    assert!(!report.degraded());
    assert!(report.candidates[0].path.ends_with("cycle_23_1/MAR00009.nxs"));
}

// ---------------------------------------------------------------------------
// 4. Corrupt control file → degraded listing
// ---------------------------------------------------------------------------

#[test]
fn corrupt_control_file_is_reported_and_listing_still_works() {
    let tmp = tempfile::tempdir().unwrap();
    let inst = instrument(tmp.path());
    touch(&inst.watch_dir.join("cycle_23_2/MAR00003.nxs"));
    touch(&inst.watch_dir.join("cycle_23_2/MAR00004.nxs"));
    write_control(&inst, "Hello world!");

    let obs = DirectoryObserver::default();
    let err = obs.scan(&inst).unwrap_err();
    assert!(matches!(err, ObserveError::ControlFileCorrupt { .. }));

    let listed = obs.list(&inst).unwrap();
    let seqs: Vec<i64> = listed.iter().map(|r| r.sequence).collect();
    assert_eq!(seqs, vec![3, 4]);
}

// ---------------------------------------------------------------------------
// 5. Missing directory
// ---------------------------------------------------------------------------

#[test]
fn missing_directory_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let inst = instrument(tmp.path());
    write_control(&inst, "MARI 00011 0\n");

    let err = DirectoryObserver::default().scan(&inst).unwrap_err();
    assert!(matches!(err, ObserveError::DirectoryUnavailable { .. }));
}

#[test]
fn empty_directory_yields_no_candidates() {
    let tmp = tempfile::tempdir().unwrap();
    let inst = instrument(tmp.path());
    fs::create_dir_all(&inst.watch_dir).unwrap();
    write_control(&inst, "MARI 00011 0\n");

    let report = DirectoryObserver::default().scan(&inst).unwrap();
    assert!(report.candidates.is_empty());
    assert_eq!(report.highest_sequence(), None);
}

// ---------------------------------------------------------------------------
// 6. Duplicate sequence
// ---------------------------------------------------------------------------

#[test]
fn duplicate_sequence_prefers_latest_cycle_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let inst = instrument(tmp.path());
    touch(&inst.watch_dir.join("cycle_22_5/MAR00020.nxs"));
    touch(&inst.watch_dir.join("cycle_23_1/MAR00020.nxs"));

    let listed = DirectoryObserver::default().list(&inst).unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].path.ends_with("cycle_23_1/MAR00020.nxs"));
}

#[test]
fn scan_depth_limits_descent() {
    let tmp = tempfile::tempdir().unwrap();
    let inst = instrument(tmp.path());
    touch(&inst.watch_dir.join("MAR00001.nxs"));
    touch(&inst.watch_dir.join("cycle_23_1/MAR00002.nxs"));
    touch(&inst.watch_dir.join("cycle_23_1/nested/MAR00003.nxs"));

    let shallow = DirectoryObserver::new(1).list(&inst).unwrap();
    assert_eq!(shallow.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![1]);

    let default = DirectoryObserver::default().list(&inst).unwrap();
    assert_eq!(default.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![1, 2]);
}
