//! Fixed-interval cycle driver with single-flight protection.

use crate::orchestrator::{OddsSource, Orchestrator, SnapshotStore, UpdatePublisher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How long shutdown waits for an in-flight cycle before abandoning it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Driver lifecycle. Constructed armed, running while the tick loop is
/// live, stopped once shutdown has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Armed,
    Running,
    Stopped,
}

/// Clears the single-flight flag on drop, so a panicking cycle cannot
/// wedge the schedule.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the schedule: a tick loop over the orchestrator plus the
/// single-flight flag that keeps cycles from overlapping.
pub struct CycleDriver<F, S, P> {
    orchestrator: Arc<Orchestrator<F, S, P>>,
    interval: Duration,
    in_flight: Arc<AtomicBool>,
    state: DriverState,
}

impl<F, S, P> CycleDriver<F, S, P>
where
    F: OddsSource + Send + Sync + 'static,
    S: SnapshotStore + Send + Sync + 'static,
    P: UpdatePublisher + Send + Sync + 'static,
{
    pub fn new(orchestrator: Orchestrator<F, S, P>, interval: Duration) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            interval,
            in_flight: Arc::new(AtomicBool::new(false)),
            state: DriverState::Armed,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Tick loop. The first cycle starts immediately; later ticks fire
    /// every `interval`. Returns once a shutdown signal arrives and the
    /// in-flight cycle has drained or been abandoned at the grace
    /// ceiling.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) {
        self.state = DriverState::Running;
        info!("Cycle driver running (interval: {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    info!("Cycle driver received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    self.start_cycle();
                }
            }
        }

        self.state = DriverState::Stopped;
        self.drain().await;
    }

    /// Start one cycle unless the previous one is still in flight. An
    /// overlapping tick is skipped entirely, not queued.
    fn start_cycle(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            info!("Previous cycle still running, skipping this tick");
            return;
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        tokio::spawn(async move {
            let _guard = guard;
            // Failures are logged, not propagated: the next tick is the
            // only retry mechanism.
            if let Err(e) = orchestrator.run_cycle().await {
                warn!("Scheduled cycle failed: {}", e);
            }
        });
    }

    /// Poll the in-flight flag at 1s granularity up to the grace
    /// ceiling. A cycle still running past the ceiling is abandoned, not
    /// force-cancelled.
    async fn drain(&self) {
        if !self.in_flight.load(Ordering::SeqCst) {
            return;
        }

        info!("Waiting for in-flight cycle to complete...");
        let mut waited = Duration::ZERO;
        while self.in_flight.load(Ordering::SeqCst) && waited < SHUTDOWN_GRACE {
            tokio::time::sleep(Duration::from_secs(1)).await;
            waited += Duration::from_secs(1);
        }

        if self.in_flight.load(Ordering::SeqCst) {
            warn!(
                "In-flight cycle did not finish within {:?}, abandoning it",
                SHUTDOWN_GRACE
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PersistenceError, PublishError, UpstreamError};
    use crate::models::{CanonicalOddsRecord, VendorGame};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Source that blocks until released, so a cycle can be held in
    /// flight deliberately.
    struct BlockingSource {
        release: Arc<Notify>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl OddsSource for BlockingSource {
        async fn fetch_odds(&self) -> Result<Vec<VendorGame>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Ok(vec![])
        }
    }

    struct AlwaysHealthyStore;

    #[async_trait]
    impl SnapshotStore for AlwaysHealthyStore {
        async fn health_check(&self) -> bool {
            true
        }

        async fn upsert_games(
            &self,
            records: &[CanonicalOddsRecord],
        ) -> Result<usize, PersistenceError> {
            Ok(records.len())
        }

        async fn insert_snapshots(
            &self,
            records: &[CanonicalOddsRecord],
        ) -> Result<usize, PersistenceError> {
            Ok(records.len())
        }
    }

    struct NullPublisher;

    #[async_trait]
    impl UpdatePublisher for NullPublisher {
        async fn publish(&self, _records: &[CanonicalOddsRecord]) -> Result<usize, PublishError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn overlapping_ticks_are_skipped_while_a_cycle_is_in_flight() {
        let release = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let source = BlockingSource {
            release: Arc::clone(&release),
            calls: Arc::clone(&calls),
        };

        let orchestrator = Orchestrator::new(source, AlwaysHealthyStore, NullPublisher);
        let driver = CycleDriver::new(orchestrator, Duration::from_secs(60));

        driver.start_cycle();
        // Let the spawned cycle reach the blocking fetch.
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // A tick arriving now must be a no-op.
        driver.start_cycle();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        release.notify_one();
        while driver.in_flight.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // With the first cycle finished, the next tick runs again.
        driver.start_cycle();
        while calls.load(Ordering::SeqCst) == 1 {
            tokio::task::yield_now().await;
        }
        release.notify_one();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn driver_moves_from_armed_through_running_to_stopped() {
        let release = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let source = BlockingSource {
            release: Arc::clone(&release),
            calls,
        };

        let orchestrator = Orchestrator::new(source, AlwaysHealthyStore, NullPublisher);
        let mut driver = CycleDriver::new(orchestrator, Duration::from_secs(60));
        assert_eq!(driver.state(), DriverState::Armed);

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        shutdown_tx.send(()).await.unwrap();
        release.notify_one();

        driver.run(shutdown_rx).await;
        assert_eq!(driver.state(), DriverState::Stopped);
    }
}
