//! Refresh scheduler behaviour on a paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{alert, project, Behavior, FakeDirectory, FakeSource};
use driftwatch::{
    AckTracker, Aggregator, AggregatorConfig, AlertFilter, AlertStatus, DirectoryError, Error,
    QueryErrorKind, RefreshScheduler, Refresher, SchedulerState, Severity,
};

const INTERVAL: Duration = Duration::from_secs(10);

fn source() -> Arc<FakeSource> {
    Arc::new(
        FakeSource::new()
            .with(
                "a",
                Behavior::Alerts(vec![alert("a", "a1", Severity::Warn, "2024-05-01T10:00:00Z")]),
            )
            .with(
                "b",
                Behavior::Alerts(vec![alert("b", "b1", Severity::Critical, "2024-05-01T11:00:00Z")]),
            )
            .with("down", Behavior::Fail(QueryErrorKind::ServerError)),
    )
}

fn scheduler(directory: Arc<FakeDirectory>, source: Arc<FakeSource>) -> RefreshScheduler {
    let aggregator = Aggregator::new(
        source,
        AggregatorConfig {
            max_in_flight: None,
            query_timeout: Duration::from_secs(3600),
        },
    );
    RefreshScheduler::new(Refresher::new(directory, aggregator, AlertFilter::all()))
}

#[tokio::test(start_paused = true)]
async fn test_first_cycle_fires_immediately() {
    let directory = Arc::new(FakeDirectory::new(vec![project("a")]));
    let scheduler = scheduler(directory, source());
    let mut updates = scheduler.subscribe();
    assert!(scheduler.latest().is_none());

    let started = tokio::time::Instant::now();
    scheduler.start(INTERVAL).await.unwrap();
    updates.changed().await.unwrap();

    assert!(started.elapsed() < INTERVAL);
    assert_eq!(scheduler.latest().unwrap().total, 1);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cycles_repeat_every_interval() {
    let directory = Arc::new(FakeDirectory::new(vec![project("a"), project("b")]));
    let scheduler = scheduler(directory.clone(), source());

    scheduler.start(INTERVAL).await.unwrap();
    tokio::time::sleep(Duration::from_secs(35)).await;

    // Ticks at 0s, 10s, 20s and 30s.
    assert_eq!(directory.calls(), 4);
    let stats = scheduler.stats();
    assert_eq!(stats.cycles_published, 4);
    assert_eq!(stats.ticks_skipped, 0);
    assert_eq!(scheduler.latest().unwrap().total, 2);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_tick_during_running_cycle_is_skipped() {
    let (directory, gate) = FakeDirectory::gated(vec![project("a")]);
    let directory = Arc::new(directory);
    let entered = directory.entered();
    let scheduler = scheduler(directory.clone(), source());
    let mut updates = scheduler.subscribe();

    scheduler.start(INTERVAL).await.unwrap();
    entered.notified().await;

    // Three ticks elapse while the first cycle is held open.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(directory.calls(), 1);
    assert_eq!(scheduler.stats().ticks_skipped, 3);
    assert!(scheduler.latest().is_none());

    gate.add_permits(1);
    updates.changed().await.unwrap();
    assert_eq!(scheduler.stats().cycles_published, 1);
    assert_eq!(scheduler.latest().unwrap().total, 1);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_cycle() {
    let (directory, gate) = FakeDirectory::gated(vec![project("a")]);
    let directory = Arc::new(directory);
    let entered = directory.entered();
    let scheduler = scheduler(directory.clone(), source());

    scheduler.start(INTERVAL).await.unwrap();
    entered.notified().await;

    scheduler.stop().await;
    gate.add_permits(100);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(scheduler.state().await, SchedulerState::Stopped);
    assert!(scheduler.latest().is_none());
    assert_eq!(scheduler.stats().cycles_published, 0);
    assert_eq!(directory.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycle_keeps_previous_snapshot() {
    let directory = Arc::new(FakeDirectory::new(vec![project("a")]));
    let scheduler = scheduler(directory.clone(), source());
    let mut updates = scheduler.subscribe();

    scheduler.start(INTERVAL).await.unwrap();
    updates.changed().await.unwrap();
    let first = scheduler.latest().unwrap();

    directory.set(Err(DirectoryError::Timeout));
    tokio::time::sleep(Duration::from_secs(15)).await;

    assert_eq!(
        scheduler.last_error().await,
        Some(Error::Directory(DirectoryError::Timeout))
    );
    assert!(Arc::ptr_eq(&first, &scheduler.latest().unwrap()));
    assert_eq!(scheduler.state().await, SchedulerState::Running);

    directory.set(Ok(vec![project("a"), project("b")]));
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(scheduler.last_error().await.is_none());
    assert_eq!(scheduler.latest().unwrap().total, 2);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_is_published_not_an_error() {
    let directory = Arc::new(FakeDirectory::new(vec![project("a"), project("down")]));
    let scheduler = scheduler(directory, source());
    let mut updates = scheduler.subscribe();

    scheduler.start(INTERVAL).await.unwrap();
    updates.changed().await.unwrap();

    let snapshot = scheduler.latest().unwrap();
    assert_eq!(snapshot.total, 1);
    assert_eq!(snapshot.failed_project_ids(), vec!["down"]);
    assert!(scheduler.last_error().await.is_none());
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_next_cycle_reconciles_provisional_ack() {
    let source = source();
    let tracker = Arc::new(AckTracker::new(source.clone()));
    let directory = Arc::new(FakeDirectory::new(vec![project("a"), project("down")]));
    let scheduler = scheduler(directory, source).with_ack_tracker(Arc::clone(&tracker));
    let mut updates = scheduler.subscribe();

    scheduler.start(INTERVAL).await.unwrap();
    updates.changed().await.unwrap();

    tracker.acknowledge("a", "a1").await.unwrap();
    tracker.acknowledge("down", "d1").await.unwrap();
    let views = tracker.view(&scheduler.latest().unwrap()).await;
    assert_eq!(views[0].effective_status(), AlertStatus::Ack);
    assert_eq!(tracker.pending().await, 2);

    // Tick at 10s.
    updates.changed().await.unwrap();

    assert!(!tracker.is_provisional("a", "a1").await);
    assert!(tracker.is_provisional("down", "d1").await);
    assert_eq!(tracker.pending().await, 1);
    scheduler.stop().await;
}
