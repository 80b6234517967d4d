//! Scenario: runs that appeared while the watcher was down are recovered.
//!
//! # Invariants under test
//! 1. Every run above the watermark is published exactly once, ascending.
//! 2. The watermark ends at the highest published run.
//! 3. Ticking again over an unchanged directory publishes nothing.
//! 4. A corrupt control file degrades to the listing instead of stalling.
//! 5. A recovery is logged at warn, both when detected and once recovered.

use std::sync::Arc;

use fw_reconcile::{InstrumentContext, ShutdownSignal};
use fw_testkit::{
    engine, fast_settings, instrument, run_files, FakeObserver, FakePublisher, MemoryStateStore,
};
use tracing_test::traced_test;

fn setup(watermark: i64) -> (Arc<MemoryStateStore>, Arc<FakePublisher>, Arc<FakeObserver>, InstrumentContext) {
    let tmp = std::env::temp_dir();
    let inst = instrument("MARI", &tmp);
    (
        Arc::new(MemoryStateStore::with_watermark("MARI", watermark)),
        Arc::new(FakePublisher::new()),
        Arc::new(FakeObserver::new()),
        InstrumentContext::new(inst),
    )
}

#[tokio::test]
async fn gap_of_four_runs_is_published_in_order() {
    let (state, publisher, observer, mut ctx) = setup(5);
    observer.set_files(run_files(&ctx.instrument, 3..=9));

    let eng = engine(&state, &publisher, &observer, fast_settings());
    let out = eng.tick(&mut ctx, &ShutdownSignal::never()).await;

    assert_eq!(publisher.delivered(), vec![6, 7, 8, 9]);
    assert_eq!(out.published, vec![6, 7, 8, 9]);
    assert!(out.recovery, "several pending runs must be flagged as recovery");
    assert_eq!(out.stop, None);
    assert_eq!(state.watermark("MARI"), Some(9));
    assert_eq!(out.last_published_after, Some(9));

    // Watermark advanced after each confirmed publish, never in bulk.
    let commits: Vec<i64> = state.commits().into_iter().map(|(_, s)| s).collect();
    assert_eq!(commits, vec![6, 7, 8, 9]);
}

#[tokio::test]
async fn second_tick_over_same_directory_publishes_nothing() {
    let (state, publisher, observer, mut ctx) = setup(5);
    observer.set_files(run_files(&ctx.instrument, 6..=7));
    let eng = engine(&state, &publisher, &observer, fast_settings());

    eng.tick(&mut ctx, &ShutdownSignal::never()).await;
    let again = eng.tick(&mut ctx, &ShutdownSignal::never()).await;

    assert!(again.published.is_empty());
    assert!(!again.recovery);
    assert_eq!(publisher.delivered(), vec![6, 7]);
}

#[tokio::test]
async fn single_new_run_is_steady_state() {
    let (state, publisher, observer, mut ctx) = setup(5);
    observer.set_files(run_files(&ctx.instrument, 5..=6));
    let eng = engine(&state, &publisher, &observer, fast_settings());

    let out = eng.tick(&mut ctx, &ShutdownSignal::never()).await;

    assert_eq!(out.published, vec![6]);
    assert!(!out.recovery);
    assert_eq!(publisher.calls()[0].destination, "watched-files");
    assert_eq!(publisher.calls()[0].notification.instrument_id, "MARI");
}

#[tokio::test]
async fn corrupt_control_file_falls_back_to_listing() {
    let (state, publisher, observer, mut ctx) = setup(5);
    observer.set_files(run_files(&ctx.instrument, 4..=7));
    observer.set_control_corrupt(true);
    let eng = engine(&state, &publisher, &observer, fast_settings());

    let out = eng.tick(&mut ctx, &ShutdownSignal::never()).await;

    assert!(out.degraded);
    assert_eq!(out.published, vec![6, 7]);
    assert_eq!(state.watermark("MARI"), Some(7));
}

#[tokio::test]
async fn control_file_caps_candidates() {
    let (state, publisher, observer, mut ctx) = setup(5);
    observer.set_files(run_files(&ctx.instrument, 6..=9));
    // Run 8 and 9 are still being written.
    observer.set_control(Some(7));
    let eng = engine(&state, &publisher, &observer, fast_settings());

    let out = eng.tick(&mut ctx, &ShutdownSignal::never()).await;

    assert_eq!(out.published, vec![6, 7]);
    assert_eq!(state.watermark("MARI"), Some(7));
}

#[tokio::test]
#[traced_test]
async fn recovery_is_logged_at_warn() {
    let (state, publisher, observer, mut ctx) = setup(5);
    observer.set_files(run_files(&ctx.instrument, 6..=8));

    let eng = engine(&state, &publisher, &observer, fast_settings());
    let out = eng.tick(&mut ctx, &ShutdownSignal::never()).await;
    assert!(out.recovery);

    logs_assert(|lines: &[&str]| {
        for msg in ["missed files detected", "missed files recovered"] {
            if !lines.iter().any(|l| l.contains("WARN") && l.contains(msg)) {
                return Err(format!("no WARN line containing {msg:?}"));
            }
        }
        Ok(())
    });
}
