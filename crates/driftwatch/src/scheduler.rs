//! Periodic refresh of the aggregate snapshot.
//!
//! The scheduler runs one [`Refresher`] cycle immediately on start and then
//! once per interval. A tick that arrives while a cycle is still running is
//! skipped. After [`RefreshScheduler::stop`] no further cycle is started and
//! the result of a cycle already in flight is discarded. An attached
//! [`AckTracker`] is reconciled against every published snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ack::AckTracker;
use crate::aggregator::{AggregateSnapshot, Refresher};
use crate::error::{Error, SchedulerError};

/// Lifecycle of a [`RefreshScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub cycles_published: u64,
    pub ticks_skipped: u64,
}

/// Latest published snapshot, `None` until the first successful cycle.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<AggregateSnapshot>>>;

struct Status {
    state: SchedulerState,
    last_error: Option<Error>,
}

struct Shared {
    status: Mutex<Status>,
    snapshot_tx: watch::Sender<Option<Arc<AggregateSnapshot>>>,
    in_flight: AtomicBool,
    cycles_published: AtomicU64,
    ticks_skipped: AtomicU64,
}

impl Shared {
    async fn publish(
        &self,
        outcome: Result<AggregateSnapshot, Error>,
        acks: Option<&AckTracker>,
    ) {
        let mut status = self.status.lock().await;
        if status.state != SchedulerState::Running {
            debug!("Scheduler no longer running, discarding cycle result");
            return;
        }

        match outcome {
            Ok(snapshot) => {
                info!(
                    total = snapshot.total,
                    open = snapshot.open_count(),
                    failed_projects = snapshot.failed_projects.len(),
                    "Publishing refreshed snapshot"
                );
                status.last_error = None;
                if let Some(acks) = acks {
                    let reconciled = acks.reconcile(&snapshot).await;
                    if reconciled > 0 {
                        debug!(reconciled, "Provisional acks settled by refresh");
                    }
                }
                self.snapshot_tx.send_replace(Some(Arc::new(snapshot)));
                self.cycles_published.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!(error = %err, "Refresh cycle failed, keeping previous snapshot");
                status.last_error = Some(err);
            }
        }
    }
}

/// Clears the in-flight flag when a cycle ends, however it ends.
struct InFlightGuard(Arc<Shared>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

/// Runs refresh cycles on a fixed interval without overlap.
pub struct RefreshScheduler {
    refresher: Arc<Refresher>,
    acks: Option<Arc<AckTracker>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl RefreshScheduler {
    pub fn new(refresher: Refresher) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            refresher: Arc::new(refresher),
            acks: None,
            shared: Arc::new(Shared {
                status: Mutex::new(Status {
                    state: SchedulerState::Idle,
                    last_error: None,
                }),
                snapshot_tx,
                in_flight: AtomicBool::new(false),
                cycles_published: AtomicU64::new(0),
                ticks_skipped: AtomicU64::new(0),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Reconcile `tracker` against each snapshot before it is published.
    #[must_use]
    pub fn with_ack_tracker(mut self, tracker: Arc<AckTracker>) -> Self {
        self.acks = Some(tracker);
        self
    }

    /// Move from idle to running and fire the first cycle immediately.
    pub async fn start(&self, interval: Duration) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        {
            let mut status = self.shared.status.lock().await;
            match status.state {
                SchedulerState::Idle => status.state = SchedulerState::Running,
                SchedulerState::Running => return Err(SchedulerError::AlreadyRunning),
                SchedulerState::Stopped => return Err(SchedulerError::Stopped),
            }
        }

        info!(interval_secs = interval.as_secs_f64(), "Starting refresh scheduler");

        let refresher = Arc::clone(&self.refresher);
        let acks = self.acks.clone();
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Refresh loop cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if shared.in_flight.swap(true, Ordering::AcqRel) {
                            shared.ticks_skipped.fetch_add(1, Ordering::Relaxed);
                            debug!("Previous cycle still running, skipping tick");
                            continue;
                        }

                        let refresher = Arc::clone(&refresher);
                        let acks = acks.clone();
                        let guard = InFlightGuard(Arc::clone(&shared));
                        tokio::spawn(async move {
                            let outcome = refresher.run_cycle().await;
                            guard.0.publish(outcome, acks.as_deref()).await;
                            drop(guard);
                        });
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop the scheduler. Results of a cycle still in flight are discarded.
    pub async fn stop(&self) {
        let mut status = self.shared.status.lock().await;
        if status.state != SchedulerState::Stopped {
            info!(previous = ?status.state, "Stopping refresh scheduler");
            status.state = SchedulerState::Stopped;
        }
        self.cancel.cancel();
    }

    pub async fn state(&self) -> SchedulerState {
        self.shared.status.lock().await.state
    }

    /// Error of the most recent cycle, cleared by the next successful one.
    pub async fn last_error(&self) -> Option<Error> {
        self.shared.status.lock().await.last_error.clone()
    }

    /// Latest successfully computed snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<AggregateSnapshot>> {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> SnapshotReceiver {
        self.shared.snapshot_tx.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_published: self.shared.cycles_published.load(Ordering::Relaxed),
            ticks_skipped: self.shared.ticks_skipped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Aggregator, AggregatorConfig};
    use crate::client::{AckOutcome, AlertSource, ProjectDirectory};
    use crate::error::{DirectoryError, QueryError};
    use crate::filter::AlertFilter;
    use crate::model::{Alert, Project};
    use async_trait::async_trait;

    struct Nothing;

    #[async_trait]
    impl ProjectDirectory for Nothing {
        async fn list_projects(&self) -> Result<Vec<Project>, DirectoryError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl AlertSource for Nothing {
        async fn list_alerts(&self, _: &str, _: &AlertFilter) -> Result<Vec<Alert>, QueryError> {
            Ok(Vec::new())
        }

        async fn acknowledge(&self, _: &str, _: &str) -> Result<AckOutcome, QueryError> {
            Ok(AckOutcome::Acknowledged)
        }
    }

    fn scheduler() -> RefreshScheduler {
        let aggregator = Aggregator::new(Arc::new(Nothing), AggregatorConfig::default());
        RefreshScheduler::new(Refresher::new(Arc::new(Nothing), aggregator, AlertFilter::all()))
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let scheduler = scheduler();
        assert_eq!(
            scheduler.start(Duration::ZERO).await,
            Err(SchedulerError::ZeroInterval)
        );
        assert_eq!(scheduler.state().await, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let scheduler = scheduler();
        assert_eq!(scheduler.state().await, SchedulerState::Idle);

        scheduler.start(Duration::from_secs(60)).await.unwrap();
        assert_eq!(scheduler.state().await, SchedulerState::Running);
        assert_eq!(
            scheduler.start(Duration::from_secs(60)).await,
            Err(SchedulerError::AlreadyRunning)
        );

        scheduler.stop().await;
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);
        assert_eq!(
            scheduler.start(Duration::from_secs(60)).await,
            Err(SchedulerError::Stopped)
        );
    }
}
