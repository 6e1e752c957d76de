use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One game entry from The Odds API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorGame {
    pub id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub commence_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    pub bookmakers: Vec<VendorBookmaker>,
}

/// Bookmaker entry nested inside a vendor game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorBookmaker {
    pub key: String,
    pub title: String,
    pub last_update: DateTime<Utc>,
    pub markets: Vec<VendorMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorMarket {
    pub key: String,
    pub outcomes: Vec<VendorOutcome>,
}

/// A single price quote within a market. `point` carries the spread or
/// total line where the market has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorOutcome {
    pub name: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<f64>,
}

/// Market categories the pipeline understands. Vendor markets with any
/// other key never reach a canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKey {
    H2h,
    Spreads,
    Totals,
}

impl MarketKey {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "h2h" => Some(MarketKey::H2h),
            "spreads" => Some(MarketKey::Spreads),
            "totals" => Some(MarketKey::Totals),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKey::H2h => "h2h",
            MarketKey::Spreads => "spreads",
            MarketKey::Totals => "totals",
        }
    }
}

/// Audit copy of the vendor data behind one canonical record, tagged by
/// market type so consumers get typed outcomes instead of an arbitrary
/// blob. Each variant retains the full vendor game, the bookmaker key,
/// and the outcome list that produced the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "market", rename_all = "lowercase")]
pub enum OddsAudit {
    H2h {
        game: VendorGame,
        bookmaker: String,
        outcomes: Vec<VendorOutcome>,
    },
    Spreads {
        game: VendorGame,
        bookmaker: String,
        outcomes: Vec<VendorOutcome>,
    },
    Totals {
        game: VendorGame,
        bookmaker: String,
        outcomes: Vec<VendorOutcome>,
    },
}

/// Normalized odds for one (game, bookmaker, market) triple. Price and
/// point fields are set only when the corresponding vendor outcome
/// exists; absence is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalOddsRecord {
    pub game_id: String,
    pub market: MarketKey,
    pub bookmaker: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_odds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_odds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub away_point: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub over_under: Option<f64>,
    pub raw_data: OddsAudit,
}

/// Deduplicated game metadata destined for the `games` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRow {
    pub id: String,
    pub home: String,
    pub away: String,
    pub tipoff: DateTime<Utc>,
}

/// One append-only row for the `odds_snapshots` table, stamped at insert
/// time rather than with the vendor's last-update time.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub game_id: String,
    pub market: String,
    pub ts: DateTime<Utc>,
    pub bookmaker: String,
    pub home_odds: Option<f64>,
    pub away_odds: Option<f64>,
    pub home_point: Option<f64>,
    pub away_point: Option<f64>,
    pub over_under: Option<f64>,
    pub raw_data: serde_json::Value,
}

/// Envelope published to the bus, one per distinct game per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMessage {
    pub game_id: String,
    pub timestamp: DateTime<Utc>,
    pub odds_count: usize,
    pub records: Vec<CanonicalOddsRecord>,
}
