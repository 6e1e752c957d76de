use crate::error::UpstreamError;
use crate::models::VendorGame;
use crate::orchestrator::OddsSource;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

const ODDS_API_BASE_URL: &str = "https://api.the-odds-api.com/v4";
const MARKETS: &str = "h2h,spreads,totals";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for The Odds API. One GET per cycle against the odds endpoint
/// for the configured sport.
pub struct OddsApiClient {
    api_key: String,
    sport_key: String,
    regions: String,
    base_url: String,
    client: reqwest::Client,
}

impl OddsApiClient {
    pub fn new(api_key: String, sport_key: String, regions: String) -> Self {
        Self {
            api_key,
            sport_key,
            regions,
            base_url: ODDS_API_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Surface the vendor's request-quota headers after each call.
    fn log_quota(&self, headers: &reqwest::header::HeaderMap) {
        if let Some(remaining) = headers.get("x-requests-remaining") {
            debug!("API requests remaining: {:?}", remaining);
        }
        if let Some(used) = headers.get("x-requests-used") {
            debug!("API requests used: {:?}", used);
        }
    }
}

#[async_trait]
impl OddsSource for OddsApiClient {
    /// Fetch the current odds board. A non-2xx response surfaces as
    /// `UpstreamError::Status` carrying the HTTP status.
    async fn fetch_odds(&self) -> Result<Vec<VendorGame>, UpstreamError> {
        let url = format!("{}/sports/{}/odds", self.base_url, self.sport_key);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("regions", self.regions.as_str()),
                ("markets", MARKETS),
                ("oddsFormat", "decimal"),
                ("dateFormat", "iso"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                status: response.status(),
            });
        }

        self.log_quota(response.headers());

        let games: Vec<VendorGame> = response.json().await?;
        info!("Fetched {} games from The Odds API", games.len());

        Ok(games)
    }
}
