//! NATS publisher for per-game odds updates.

use crate::error::PublishError;
use crate::models::{CanonicalOddsRecord, GameMessage};
use crate::normalizer::group_by_game;
use crate::orchestrator::UpdatePublisher;
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Subject prefix all per-game updates land under. The game id becomes
/// the subject suffix, so consumers subscribe to `odds.updates.>` and
/// keep per-game ordering.
pub const UPDATES_SUBJECT_PREFIX: &str = "odds.updates";

/// Publisher over a lazily-established NATS connection.
pub struct NatsPublisher {
    url: String,
    client: Mutex<Option<async_nats::Client>>,
}

impl NatsPublisher {
    /// Create an unconnected publisher. The connection is established on
    /// first use.
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Mutex::new(None),
        }
    }

    /// Connect if not already connected. Safe to call repeatedly.
    pub async fn connect(&self) -> Result<(), PublishError> {
        self.client().await.map(|_| ())
    }

    async fn client(&self) -> Result<async_nats::Client, PublishError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        info!("Connecting to NATS at {}", self.url);
        let client = async_nats::connect(self.url.as_str())
            .await
            .context("Failed to connect to NATS")?;
        *guard = Some(client.clone());

        Ok(client)
    }

    /// Best-effort teardown for shutdown paths. Failures are logged and
    /// swallowed so they cannot block process exit.
    pub async fn disconnect(&self) {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.take() {
            if let Err(e) = client.flush().await {
                warn!("Error flushing NATS connection during shutdown: {}", e);
            }
        }
    }

    /// Publish a throwaway probe message to verify live connectivity.
    pub async fn health_check(&self) -> bool {
        let result: Result<(), PublishError> = async {
            let client = self.client().await?;
            let probe = serde_json::json!({
                "type": "health-check",
                "timestamp": Utc::now(),
            });
            client
                .publish(
                    format!("{}.health-check", UPDATES_SUBJECT_PREFIX),
                    Bytes::from(probe.to_string()),
                )
                .await
                .context("Failed to publish probe message")?;
            client.flush().await.context("Failed to flush probe message")?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("NATS health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl UpdatePublisher for NatsPublisher {
    /// Publish exactly one message per distinct game id, in first-seen
    /// game order. Empty input is a no-op, not an error.
    async fn publish(&self, records: &[CanonicalOddsRecord]) -> Result<usize, PublishError> {
        if records.is_empty() {
            return Ok(0);
        }

        let client = self.client().await?;
        let groups = group_by_game(records);
        let message_count = groups.len();
        let now = Utc::now();

        for (game_id, game_records) in groups {
            let message = GameMessage {
                game_id: game_id.clone(),
                timestamp: now,
                odds_count: game_records.len(),
                records: game_records,
            };
            let payload =
                serde_json::to_vec(&message).context("Failed to serialize game message")?;
            let subject = format!("{}.{}", UPDATES_SUBJECT_PREFIX, game_id);

            client
                .publish(subject, Bytes::from(payload))
                .await
                .context("Failed to publish game message")?;
        }

        client.flush().await.context("Failed to flush published updates")?;

        info!("Published {} game updates", message_count);
        Ok(message_count)
    }
}
