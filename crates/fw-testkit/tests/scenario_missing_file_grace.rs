//! Scenario: a run is absent from the listing while later runs exist.
//!
//! # Invariants under test
//! 1. Runs before the gap publish; the gap halts the tick (order preserved).
//! 2. The gap is waited on for the grace period, then skipped with an audit
//!    row per missing sequence, and later runs publish. Each skipped record
//!    carries the number of ticks it was waited on.
//! 3. A file arriving within the grace period is published normally.

use std::sync::Arc;

use fw_reconcile::{InstrumentContext, ShutdownSignal, StopReason};
use fw_schemas::PublishStatus;
use fw_testkit::{
    engine, fast_settings, instrument, run_files, FakeObserver, FakePublisher, MemoryStateStore,
};

#[tokio::test]
async fn gap_is_skipped_after_grace_ticks() {
    let state = Arc::new(MemoryStateStore::with_watermark("MARI", 5));
    let publisher = Arc::new(FakePublisher::new());
    let observer = Arc::new(FakeObserver::new());
    let mut ctx = InstrumentContext::new(instrument("MARI", &std::env::temp_dir()));
    observer.set_files(run_files(&ctx.instrument, [6, 9, 10]));

    let settings = fast_settings();
    let eng = engine(&state, &publisher, &observer, settings);

    for tick in 1..=settings.missing_file_grace_ticks {
        let out = eng.tick(&mut ctx, &ShutdownSignal::never()).await;
        assert_eq!(
            out.stop,
            Some(StopReason::WaitingForFile { sequence: 7 }),
            "tick {tick} should still wait"
        );
    }
    assert_eq!(publisher.delivered(), vec![6]);

    let out = eng.tick(&mut ctx, &ShutdownSignal::never()).await;
    assert_eq!(out.skipped, vec![7, 8]);
    assert_eq!(out.published, vec![9, 10]);
    assert_eq!(state.watermark("MARI"), Some(10));
    assert_eq!(ctx.ledger.status(8), Some(PublishStatus::Skipped));
    assert_eq!(
        ctx.ledger.get(8).map(|r| r.missing_ticks),
        Some(settings.missing_file_grace_ticks + 1)
    );

    let audited: Vec<(i64, PublishStatus)> = state
        .failures()
        .into_iter()
        .map(|f| (f.sequence, f.status))
        .collect();
    assert_eq!(
        audited,
        vec![(7, PublishStatus::Skipped), (8, PublishStatus::Skipped)]
    );
}

#[tokio::test]
async fn late_file_within_grace_is_published() {
    let state = Arc::new(MemoryStateStore::with_watermark("MARI", 5));
    let publisher = Arc::new(FakePublisher::new());
    let observer = Arc::new(FakeObserver::new());
    let mut ctx = InstrumentContext::new(instrument("MARI", &std::env::temp_dir()));
    observer.set_files(run_files(&ctx.instrument, [6, 8]));

    let eng = engine(&state, &publisher, &observer, fast_settings());
    eng.tick(&mut ctx, &ShutdownSignal::never()).await;

    observer.set_files(run_files(&ctx.instrument, [6, 7, 8]));
    let out = eng.tick(&mut ctx, &ShutdownSignal::never()).await;

    assert_eq!(out.published, vec![7, 8]);
    assert!(out.skipped.is_empty());
    assert_eq!(publisher.delivered(), vec![6, 7, 8]);
}
