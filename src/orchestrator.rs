//! Per-cycle orchestration: health gate, fetch, normalize, persist,
//! publish, with explicit early exits.

use crate::error::{IngestError, PersistenceError, PublishError, UpstreamError};
use crate::models::{CanonicalOddsRecord, VendorGame};
use crate::normalizer;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Source of vendor odds payloads.
#[async_trait]
pub trait OddsSource {
    async fn fetch_odds(&self) -> Result<Vec<VendorGame>, UpstreamError>;
}

/// Store for game metadata and odds snapshots.
#[async_trait]
pub trait SnapshotStore {
    async fn health_check(&self) -> bool;
    async fn upsert_games(&self, records: &[CanonicalOddsRecord])
        -> Result<usize, PersistenceError>;
    async fn insert_snapshots(
        &self,
        records: &[CanonicalOddsRecord],
    ) -> Result<usize, PersistenceError>;
}

/// Downstream bus for per-game updates.
#[async_trait]
pub trait UpdatePublisher {
    async fn publish(&self, records: &[CanonicalOddsRecord]) -> Result<usize, PublishError>;
}

// The entrypoint keeps a handle on the publisher for teardown after the
// orchestrator has been moved into the driver.
#[async_trait]
impl<T> UpdatePublisher for Arc<T>
where
    T: UpdatePublisher + Send + Sync,
{
    async fn publish(&self, records: &[CanonicalOddsRecord]) -> Result<usize, PublishError> {
        (**self).publish(records).await
    }
}

/// Why a cycle finished early without being a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The vendor returned no games.
    NoGames,
    /// Normalization produced no records; happens when every market key
    /// is unrecognized.
    NoRecords,
}

/// Counts for a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub games: usize,
    pub records: usize,
    pub messages: usize,
}

/// Explicit cycle result, so empty-but-successful never reads as a
/// failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed(CycleStats),
}

/// Sequences one ingestion cycle over injected collaborators. Not
/// reentrant: the driver guarantees at most one `run_cycle` in flight.
pub struct Orchestrator<F, S, P> {
    source: F,
    store: S,
    publisher: P,
}

impl<F, S, P> Orchestrator<F, S, P>
where
    F: OddsSource + Send + Sync,
    S: SnapshotStore + Send + Sync,
    P: UpdatePublisher + Send + Sync,
{
    pub fn new(source: F, store: S, publisher: P) -> Self {
        Self {
            source,
            store,
            publisher,
        }
    }

    /// Run one full cycle. The first error aborts the cycle; rows
    /// persisted before a publish failure stay persisted.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, IngestError> {
        let started = Instant::now();
        info!("Starting odds ingestion cycle");

        let outcome = self.run_stages().await;
        let elapsed_ms = started.elapsed().as_millis();

        match &outcome {
            Ok(CycleOutcome::Completed(stats)) => {
                info!(
                    "Cycle completed in {}ms: {} games, {} records, {} messages",
                    elapsed_ms, stats.games, stats.records, stats.messages
                );
            }
            Ok(CycleOutcome::Skipped(reason)) => {
                info!("Cycle skipped after {}ms: {:?}", elapsed_ms, reason);
            }
            Err(e) => {
                warn!("Cycle failed after {}ms: {}", elapsed_ms, e);
            }
        }

        outcome
    }

    async fn run_stages(&self) -> Result<CycleOutcome, IngestError> {
        // Gate on the store before spending a vendor call.
        if !self.store.health_check().await {
            return Err(IngestError::StoreUnhealthy);
        }

        let games = self.source.fetch_odds().await?;
        if games.is_empty() {
            return Ok(CycleOutcome::Skipped(SkipReason::NoGames));
        }

        let records = normalizer::normalize(&games);
        if records.is_empty() {
            return Ok(CycleOutcome::Skipped(SkipReason::NoRecords));
        }

        self.store.upsert_games(&records).await?;
        self.store.insert_snapshots(&records).await?;

        let messages = match self.publisher.publish(&records).await {
            Ok(count) => count,
            Err(e) => {
                // Rows for this cycle are already committed with no bus
                // notification; the next cycle re-sends current odds.
                warn!("Publish failed after snapshots were persisted: {}", e);
                return Err(IngestError::Publish(e));
            }
        };

        Ok(CycleOutcome::Completed(CycleStats {
            games: games.len(),
            records: records.len(),
            messages,
        }))
    }
}
