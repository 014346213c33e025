// =============================================================================
// CoinGecko Source — daily closes from /coins/{id}/market_chart
// =============================================================================
//
// Response shape:
//   { "prices": [[timestamp_ms, price], ...], "market_caps": [...], ... }
//
// Points arrive oldest first; only the price column is kept.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{get_json, PriceSeriesSource, RetrievalError};
use crate::runtime_config::AssetConfig;

/// Public CoinGecko API root.
pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

/// Daily price history from CoinGecko, addressed by coin id.
#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoSource {
    /// Create a source that re-uses an existing HTTP client.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl PriceSeriesSource for CoinGeckoSource {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    /// GET /coins/{id}/market_chart?vs_currency=usd&days={lookback}&interval=daily
    #[instrument(skip(self, asset), fields(symbol = %asset.symbol), name = "coingecko::fetch_closes")]
    async fn fetch_closes(
        &self,
        asset: &AssetConfig,
        lookback: u32,
    ) -> Result<Vec<f64>, RetrievalError> {
        let coin_id = asset.coin_id();
        let url = format!("{}/coins/{}/market_chart", self.base_url, coin_id);
        let days = lookback.to_string();

        let request = self.client.get(&url).query(&[
            ("vs_currency", "usd"),
            ("days", days.as_str()),
            ("interval", "daily"),
        ]);

        let chart: MarketChart = get_json(request).await?;
        if chart.prices.is_empty() {
            return Err(RetrievalError::Empty(coin_id));
        }

        let closes: Vec<f64> = chart.prices.into_iter().map(|(_, price)| price).collect();
        debug!(coin_id = %coin_id, count = closes.len(), "daily closes fetched");
        Ok(closes)
    }
}
