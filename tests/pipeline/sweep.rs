use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{fast_config, init_tracing, Harness},
    memory_store::MemoryLedgers,
};
use anyhow::Result;
use ledgersync::{IngestConfigBuilder, IngestError};
use tokio::time::timeout;

const CURRENT: u32 = 2;

/// Twenty ingested ledgers at the current version except `outdated`.
fn ledgers_with_outdated(outdated: &[u32]) -> Arc<MemoryLedgers> {
    let ledgers = MemoryLedgers::new(20);
    ledgers.seed_history(20, CURRENT);
    ledgers.set_version(outdated, CURRENT - 1);
    ledgers
}

fn config() -> IngestConfigBuilder {
    fast_config().ingest_version(CURRENT)
}

#[tokio::test]
async fn contiguous_outdated_ledgers_are_one_range() -> Result<()> {
    init_tracing();
    let harness = Harness::new(ledgers_with_outdated(&[3, 4, 5]), config().build()?);

    let total = harness.ingester.reingest_outdated().await?;
    assert_eq!(total, 3);
    assert_eq!(harness.sessions.ranges(), vec![(3, 5)]);
    assert_eq!(harness.ledgers.outdated_queries(), 2, "stops after empty page");
    assert_eq!(harness.ledgers.history_version(4), Some(CURRENT));
    assert!(harness
        .sessions
        .requests()
        .iter()
        .all(|request| request.overwrite_existing && request.version == CURRENT));
    Ok(())
}

#[tokio::test]
async fn gaps_split_the_sweep_into_ranges() -> Result<()> {
    init_tracing();
    let harness = Harness::new(
        ledgers_with_outdated(&[1, 2, 3, 7, 8, 10]),
        config().build()?,
    );

    assert_eq!(harness.ingester.reingest_outdated().await?, 6);
    assert_eq!(
        harness.sessions.ranges(),
        vec![(1, 3), (7, 8), (10, 10)]
    );
    Ok(())
}

#[tokio::test]
async fn sweep_pages_through_outdated_ledgers() -> Result<()> {
    init_tracing();
    let outdated: Vec<u32> = (1..=10).collect();
    let harness = Harness::new(
        ledgers_with_outdated(&outdated),
        config().outdated_batch_size(4).build()?,
    );

    assert_eq!(harness.ingester.reingest_outdated().await?, 10);
    assert_eq!(harness.sessions.ranges(), vec![(1, 4), (5, 8), (9, 10)]);
    assert_eq!(harness.ledgers.outdated_queries(), 4);
    assert_eq!(harness.ingester.telemetry().snapshot().sweep_queries, 4);
    Ok(())
}

#[tokio::test]
async fn nothing_outdated_is_a_single_query() -> Result<()> {
    init_tracing();
    let harness = Harness::new(ledgers_with_outdated(&[]), config().build()?);

    assert_eq!(harness.ingester.reingest_outdated().await?, 0);
    assert!(harness.sessions.requests().is_empty());
    assert_eq!(harness.ledgers.outdated_queries(), 1);
    Ok(())
}

#[tokio::test]
async fn first_range_failure_aborts_the_sweep() -> Result<()> {
    init_tracing();
    let harness = Harness::new(
        ledgers_with_outdated(&[1, 2, 3, 7, 8, 10]),
        config().build()?,
    );
    harness
        .sessions
        .script()
        .fail_at
        .store(8, Ordering::SeqCst);

    let err = harness.ingester.reingest_outdated().await.unwrap_err();
    match &err {
        IngestError::SweepAborted { ingested, source } => {
            assert_eq!(*ingested, 3);
            assert!(matches!(**source, IngestError::Session { .. }));
        }
        other => panic!("expected aborted sweep, got {other:?}"),
    }
    assert_eq!(harness.sessions.ranges(), vec![(1, 3), (7, 8)]);
    assert_eq!(harness.ledgers.outdated_queries(), 1);
    Ok(())
}

#[tokio::test]
async fn outdated_query_failure_is_returned() -> Result<()> {
    init_tracing();
    let harness = Harness::new(ledgers_with_outdated(&[4]), config().build()?);
    harness.ledgers.fail_outdated(true);

    let err = harness.ingester.reingest_outdated().await.unwrap_err();
    match &err {
        IngestError::SweepAborted { ingested, source } => {
            assert_eq!(*ingested, 0);
            assert!(source.is_state_query());
        }
        other => panic!("expected aborted sweep, got {other:?}"),
    }
    assert!(harness.sessions.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn stall_detection_stops_a_sweep_that_makes_no_progress() -> Result<()> {
    init_tracing();
    let harness = Harness::new(
        ledgers_with_outdated(&[3, 4, 5]),
        config().sweep_detect_stalls(true).build()?,
    );
    harness
        .sessions
        .script()
        .silently_skip_versions
        .store(true, Ordering::SeqCst);

    let err = harness.ingester.reingest_outdated().await.unwrap_err();
    match &err {
        IngestError::SweepAborted { ingested, source } => {
            assert_eq!(*ingested, 3);
            assert!(matches!(
                **source,
                IngestError::SweepStalled { lowest: 3, len: 3 }
            ));
        }
        other => panic!("expected stalled sweep, got {other:?}"),
    }
    assert_eq!(harness.ledgers.outdated_queries(), 2);
    Ok(())
}

#[tokio::test]
async fn iteration_limit_bounds_the_sweep() -> Result<()> {
    init_tracing();
    let harness = Harness::new(
        ledgers_with_outdated(&[3, 4, 5]),
        config().sweep_max_iterations(3).build()?,
    );
    harness
        .sessions
        .script()
        .silently_skip_versions
        .store(true, Ordering::SeqCst);

    let err = harness.ingester.reingest_outdated().await.unwrap_err();
    match &err {
        IngestError::SweepAborted { ingested, source } => {
            assert_eq!(*ingested, 9);
            assert!(matches!(
                **source,
                IngestError::SweepLimitReached { iterations: 3 }
            ));
        }
        other => panic!("expected limited sweep, got {other:?}"),
    }
    assert_eq!(harness.sessions.ranges(), vec![(3, 5), (3, 5), (3, 5)]);
    assert_eq!(harness.ledgers.outdated_queries(), 4);
    Ok(())
}

#[tokio::test]
async fn final_empty_query_does_not_count_against_the_limit() -> Result<()> {
    init_tracing();
    let harness = Harness::new(
        ledgers_with_outdated(&[3, 4, 5]),
        config().sweep_max_iterations(1).build()?,
    );

    assert_eq!(harness.ingester.reingest_outdated().await?, 3);
    assert_eq!(harness.sessions.ranges(), vec![(3, 5)]);
    assert_eq!(harness.ledgers.outdated_queries(), 2);
    assert_eq!(harness.ledgers.history_version(4), Some(CURRENT));
    Ok(())
}

#[tokio::test]
async fn limit_equal_to_page_count_lets_a_paged_sweep_finish() -> Result<()> {
    init_tracing();
    let outdated: Vec<u32> = (1..=10).collect();
    let harness = Harness::new(
        ledgers_with_outdated(&outdated),
        config()
            .outdated_batch_size(4)
            .sweep_max_iterations(3)
            .build()?,
    );

    assert_eq!(harness.ingester.reingest_outdated().await?, 10);
    assert_eq!(harness.sessions.ranges(), vec![(1, 4), (5, 8), (9, 10)]);
    Ok(())
}

#[tokio::test]
async fn unbounded_sweep_keeps_requerying_without_progress() -> Result<()> {
    init_tracing();
    let harness = Harness::new(ledgers_with_outdated(&[3, 4, 5]), config().build()?);
    harness
        .sessions
        .script()
        .silently_skip_versions
        .store(true, Ordering::SeqCst);

    let outcome = timeout(
        Duration::from_millis(200),
        harness.ingester.reingest_outdated(),
    )
    .await;
    assert!(outcome.is_err(), "sweep should still be running");
    assert!(harness.ledgers.outdated_queries() > 3);
    Ok(())
}
