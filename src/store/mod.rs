//! PostgreSQL adapter: game upserts and append-only odds snapshots.

use crate::error::PersistenceError;
use crate::models::{CanonicalOddsRecord, GameRow, SnapshotRow};
use crate::orchestrator::SnapshotStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tracing::{info, warn};

/// Rows per snapshot INSERT statement.
pub const SNAPSHOT_BATCH_SIZE: usize = 100;

/// Connection settings for the odds store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub password: String,
    pub max_connections: usize,
}

impl StoreConfig {
    pub fn new(url: String, password: String) -> Self {
        Self {
            url,
            password,
            max_connections: 8,
        }
    }
}

/// Store adapter over a deadpool-postgres pool. Carries no business
/// logic beyond dedup and batching.
pub struct PgOddsStore {
    pool: Pool,
}

impl PgOddsStore {
    /// Build a connection pool against the configured store. Fails fast
    /// when the URL does not parse; actual connectivity is probed by
    /// `health_check` at the start of every cycle.
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let mut pg_config = config
            .url
            .parse::<tokio_postgres::Config>()
            .context("Failed to parse database URL")?;
        pg_config.password(&config.password);

        let manager = deadpool_postgres::Manager::from_config(
            pg_config,
            tokio_postgres::NoTls,
            deadpool_postgres::ManagerConfig {
                recycling_method: deadpool_postgres::RecyclingMethod::Fast,
            },
        );

        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .context("Failed to create database pool")?;

        Ok(Self { pool })
    }

    async fn get_client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .context("Failed to get database connection from pool")
    }
}

#[async_trait]
impl SnapshotStore for PgOddsStore {
    /// Trivial read against the `games` table. All failures collapse
    /// into "unhealthy" so the caller can gate the cycle on a plain
    /// bool.
    async fn health_check(&self) -> bool {
        let client = match self.pool.get().await {
            Ok(client) => client,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                return false;
            }
        };

        match client.query_opt("SELECT id FROM games LIMIT 1", &[]).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                false
            }
        }
    }

    /// Upsert one row per distinct game id. First occurrence wins during
    /// dedup; a conflicting id is overwritten whole, not merged.
    async fn upsert_games(
        &self,
        records: &[CanonicalOddsRecord],
    ) -> Result<usize, PersistenceError> {
        let rows = dedup_games(records);
        if rows.is_empty() {
            return Ok(0);
        }

        let client = self
            .get_client()
            .await
            .map_err(|e| PersistenceError::new(0, e))?;

        let mut sql = String::from("INSERT INTO games (id, home, away, tipoff) VALUES ");
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(rows.len() * 4);
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let base = i * 4;
            sql.push_str(&format!(
                "(${}, ${}, ${}, ${})",
                base + 1,
                base + 2,
                base + 3,
                base + 4
            ));
            params.push(&row.id);
            params.push(&row.home);
            params.push(&row.away);
            params.push(&row.tipoff);
        }
        sql.push_str(
            " ON CONFLICT (id) DO UPDATE SET \
             home = EXCLUDED.home, away = EXCLUDED.away, tipoff = EXCLUDED.tipoff",
        );

        client
            .execute(sql.as_str(), &params)
            .await
            .map_err(|e| {
                PersistenceError::new(0, anyhow::Error::new(e).context("Failed to upsert games"))
            })?;

        info!("Upserted {} games", rows.len());
        Ok(rows.len())
    }

    /// Insert snapshot rows in fixed-size batches, sequentially. The
    /// first failing batch stops the remainder; batches already executed
    /// stay committed and the error reports how many.
    async fn insert_snapshots(
        &self,
        records: &[CanonicalOddsRecord],
    ) -> Result<usize, PersistenceError> {
        if records.is_empty() {
            return Ok(0);
        }

        let rows = snapshot_rows(records, Utc::now()).map_err(|e| PersistenceError::new(0, e))?;

        let client = self
            .get_client()
            .await
            .map_err(|e| PersistenceError::new(0, e))?;

        let mut committed = 0usize;
        for batch in rows.chunks(SNAPSHOT_BATCH_SIZE) {
            let mut sql = String::from(
                "INSERT INTO odds_snapshots \
                 (game_id, market, ts, bookmaker, home_odds, away_odds, \
                 home_point, away_point, over_under, raw_data) VALUES ",
            );
            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(batch.len() * 10);
            for (i, row) in batch.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let base = i * 10;
                let placeholders: Vec<String> =
                    (1..=10).map(|n| format!("${}", base + n)).collect();
                sql.push_str(&format!("({})", placeholders.join(", ")));
                params.push(&row.game_id);
                params.push(&row.market);
                params.push(&row.ts);
                params.push(&row.bookmaker);
                params.push(&row.home_odds);
                params.push(&row.away_odds);
                params.push(&row.home_point);
                params.push(&row.away_point);
                params.push(&row.over_under);
                params.push(&row.raw_data);
            }

            client.execute(sql.as_str(), &params).await.map_err(|e| {
                PersistenceError::new(
                    committed,
                    anyhow::Error::new(e).context("Failed to insert odds snapshots batch"),
                )
            })?;

            committed += 1;
        }

        info!(
            "Inserted {} snapshots in {} batches",
            rows.len(),
            committed
        );
        Ok(rows.len())
    }
}

/// First occurrence of each game id wins; later duplicates are
/// discarded, not merged.
fn dedup_games(records: &[CanonicalOddsRecord]) -> Vec<GameRow> {
    let mut rows: Vec<GameRow> = Vec::new();

    for record in records {
        if rows.iter().any(|row| row.id == record.game_id) {
            continue;
        }
        rows.push(GameRow {
            id: record.game_id.clone(),
            home: record.home_team.clone(),
            away: record.away_team.clone(),
            tipoff: record.commence_time,
        });
    }

    rows
}

/// Map canonical records onto snapshot rows stamped with the insertion
/// time, not the vendor's last-update time.
fn snapshot_rows(
    records: &[CanonicalOddsRecord],
    ts: DateTime<Utc>,
) -> Result<Vec<SnapshotRow>> {
    records
        .iter()
        .map(|record| {
            let raw_data = serde_json::to_value(&record.raw_data)
                .context("Failed to serialize audit payload")?;
            Ok(SnapshotRow {
                game_id: record.game_id.clone(),
                market: record.market.as_str().to_string(),
                ts,
                bookmaker: record.bookmaker.clone(),
                home_odds: record.home_odds,
                away_odds: record.away_odds,
                home_point: record.home_point,
                away_point: record.away_point,
                over_under: record.over_under,
                raw_data,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketKey, OddsAudit, VendorGame};
    use chrono::TimeZone;

    fn record(game_id: &str, home: &str, bookmaker: &str) -> CanonicalOddsRecord {
        let game = VendorGame {
            id: game_id.to_string(),
            sport_key: "basketball_nba".to_string(),
            sport_title: "NBA".to_string(),
            commence_time: Utc.with_ymd_and_hms(2025, 11, 2, 19, 30, 0).unwrap(),
            home_team: home.to_string(),
            away_team: "Visitors".to_string(),
            bookmakers: vec![],
        };

        CanonicalOddsRecord {
            game_id: game_id.to_string(),
            market: MarketKey::H2h,
            bookmaker: bookmaker.to_string(),
            home_team: home.to_string(),
            away_team: "Visitors".to_string(),
            commence_time: game.commence_time,
            home_odds: Some(1.9),
            away_odds: Some(1.9),
            home_point: None,
            away_point: None,
            over_under: None,
            raw_data: OddsAudit::H2h {
                game,
                bookmaker: bookmaker.to_string(),
                outcomes: vec![],
            },
        }
    }

    fn offline_store() -> PgOddsStore {
        // The pool connects lazily, so no database is needed for the
        // empty-input paths.
        PgOddsStore::connect(&StoreConfig::new(
            "postgres://ingest@localhost/odds".to_string(),
            "secret".to_string(),
        ))
        .unwrap()
    }

    #[test]
    fn dedup_keeps_first_seen_game() {
        let records = vec![
            record("g1", "First Home", "draftkings"),
            record("g1", "Second Home", "fanduel"),
            record("g2", "Other Home", "draftkings"),
        ];

        let rows = dedup_games(&records);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "g1");
        assert_eq!(rows[0].home, "First Home");
        assert_eq!(rows[1].id, "g2");
    }

    #[test]
    fn snapshot_rows_stamp_insertion_time() {
        let records = vec![record("g1", "Home", "draftkings")];
        let ts = Utc.with_ymd_and_hms(2025, 11, 2, 20, 0, 0).unwrap();

        let rows = snapshot_rows(&records, ts).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ts, ts);
        assert_eq!(rows[0].market, "h2h");
        assert!(rows[0].raw_data.is_object());
    }

    #[test]
    fn snapshots_batch_in_chunks_of_one_hundred() {
        let records: Vec<_> = (0..250)
            .map(|i| record(&format!("g{}", i), "Home", "draftkings"))
            .collect();
        let ts = Utc::now();

        let rows = snapshot_rows(&records, ts).unwrap();
        let batches: Vec<_> = rows.chunks(SNAPSHOT_BATCH_SIZE).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(batches[1].len(), 100);
        assert_eq!(batches[2].len(), 50);
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op_without_touching_the_pool() {
        let store = offline_store();

        assert_eq!(store.upsert_games(&[]).await.unwrap(), 0);
        assert_eq!(store.insert_snapshots(&[]).await.unwrap(), 0);
    }
}
