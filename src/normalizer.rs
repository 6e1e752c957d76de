//! Flattens heterogeneous vendor market payloads into canonical records.

use crate::models::{
    CanonicalOddsRecord, MarketKey, OddsAudit, VendorGame, VendorMarket, VendorOutcome,
};

/// Flatten every (game, bookmaker, market) triple into one canonical
/// record. Pure and deterministic: output order follows the
/// games-then-bookmakers-then-markets order of the input, and a missing
/// outcome leaves its fields unset rather than failing.
pub fn normalize(games: &[VendorGame]) -> Vec<CanonicalOddsRecord> {
    let mut records = Vec::new();

    for game in games {
        for bookmaker in &game.bookmakers {
            for market in &bookmaker.markets {
                let key = match MarketKey::parse(&market.key) {
                    Some(key) => key,
                    // Unrecognized market types are dropped, not errors.
                    None => continue,
                };

                records.push(build_record(game, &bookmaker.key, key, market));
            }
        }
    }

    records
}

/// Group records by game id, preserving first-seen game order so
/// publication is reproducible for identical input.
pub fn group_by_game(records: &[CanonicalOddsRecord]) -> Vec<(String, Vec<CanonicalOddsRecord>)> {
    let mut groups: Vec<(String, Vec<CanonicalOddsRecord>)> = Vec::new();

    for record in records {
        match groups.iter_mut().find(|(id, _)| id == &record.game_id) {
            Some((_, bucket)) => bucket.push(record.clone()),
            None => groups.push((record.game_id.clone(), vec![record.clone()])),
        }
    }

    groups
}

fn build_record(
    game: &VendorGame,
    bookmaker: &str,
    key: MarketKey,
    market: &VendorMarket,
) -> CanonicalOddsRecord {
    let mut record = CanonicalOddsRecord {
        game_id: game.id.clone(),
        market: key,
        bookmaker: bookmaker.to_string(),
        home_team: game.home_team.clone(),
        away_team: game.away_team.clone(),
        commence_time: game.commence_time,
        home_odds: None,
        away_odds: None,
        home_point: None,
        away_point: None,
        over_under: None,
        raw_data: audit_payload(game, bookmaker, key, &market.outcomes),
    };

    match key {
        MarketKey::H2h => {
            record.home_odds = find_outcome(&market.outcomes, &game.home_team).map(|o| o.price);
            record.away_odds = find_outcome(&market.outcomes, &game.away_team).map(|o| o.price);
        }
        MarketKey::Spreads => {
            if let Some(home) = find_outcome(&market.outcomes, &game.home_team) {
                record.home_odds = Some(home.price);
                record.home_point = home.point;
            }
            if let Some(away) = find_outcome(&market.outcomes, &game.away_team) {
                record.away_odds = Some(away.price);
                record.away_point = away.point;
            }
        }
        MarketKey::Totals => {
            let over = find_outcome(&market.outcomes, "Over");
            let under = find_outcome(&market.outcomes, "Under");
            record.home_odds = over.map(|o| o.price);
            record.away_odds = under.map(|o| o.price);
            // Over's line wins when both sides quote one.
            record.over_under = over
                .and_then(|o| o.point)
                .or_else(|| under.and_then(|o| o.point));
        }
    }

    record
}

fn find_outcome<'a>(outcomes: &'a [VendorOutcome], name: &str) -> Option<&'a VendorOutcome> {
    outcomes.iter().find(|o| o.name == name)
}

fn audit_payload(
    game: &VendorGame,
    bookmaker: &str,
    key: MarketKey,
    outcomes: &[VendorOutcome],
) -> OddsAudit {
    let game = game.clone();
    let bookmaker = bookmaker.to_string();
    let outcomes = outcomes.to_vec();

    match key {
        MarketKey::H2h => OddsAudit::H2h {
            game,
            bookmaker,
            outcomes,
        },
        MarketKey::Spreads => OddsAudit::Spreads {
            game,
            bookmaker,
            outcomes,
        },
        MarketKey::Totals => OddsAudit::Totals {
            game,
            bookmaker,
            outcomes,
        },
    }
}
