// =============================================================================
// CryptoCompare Source — 4-hour closes from /data/v2/histohour (aggregate=4)
// =============================================================================
//
// Response shape:
//   { "Response": "Success", "Data": { "Data": [{ "time": 1700000000,
//     "close": 35000.1, ... }, ...] } }
//
// API-level failures still come back as HTTP 200 with
// `"Response": "Error"` and a `Message`.  The API key is optional; without it
// requests are rate limited harder.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{get_json, PriceSeriesSource, RetrievalError};
use crate::runtime_config::AssetConfig;

/// Public CryptoCompare API root.
pub const CRYPTOCOMPARE_BASE_URL: &str = "https://min-api.cryptocompare.com";

/// Hours per candle.
const AGGREGATE_HOURS: u32 = 4;

#[derive(Debug, Deserialize)]
struct HistoResponse {
    #[serde(rename = "Response", default)]
    response: Option<String>,

    #[serde(rename = "Message", default)]
    message: Option<String>,

    #[serde(rename = "Data", default)]
    data: HistoData,
}

#[derive(Debug, Default, Deserialize)]
struct HistoData {
    #[serde(rename = "Data", default)]
    bars: Vec<HistoBar>,
}

#[derive(Debug, Deserialize)]
struct HistoBar {
    close: f64,
}

/// 4-hour candles from CryptoCompare, addressed by symbol.
#[derive(Clone)]
pub struct CryptoCompareSource {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl CryptoCompareSource {
    /// Create a source that re-uses an existing HTTP client.
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        }
    }
}

#[async_trait]
impl PriceSeriesSource for CryptoCompareSource {
    fn name(&self) -> &'static str {
        "cryptocompare"
    }

    /// GET /data/v2/histohour?fsym={symbol}&tsym=USD&limit={lookback}&aggregate=4
    #[instrument(skip(self, asset), fields(symbol = %asset.symbol), name = "cryptocompare::fetch_closes")]
    async fn fetch_closes(
        &self,
        asset: &AssetConfig,
        lookback: u32,
    ) -> Result<Vec<f64>, RetrievalError> {
        let url = format!("{}/data/v2/histohour", self.base_url);
        let symbol = asset.symbol.as_str();
        let limit = lookback.to_string();
        let aggregate = AGGREGATE_HOURS.to_string();

        let mut request = self.client.get(&url).query(&[
            ("fsym", symbol),
            ("tsym", "USD"),
            ("limit", limit.as_str()),
            ("aggregate", aggregate.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("authorization", format!("Apikey {key}"));
        }

        let body: HistoResponse = get_json(request).await?;
        if body.response.as_deref() == Some("Error") {
            return Err(RetrievalError::Provider(
                body.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        if body.data.bars.is_empty() {
            return Err(RetrievalError::Empty(symbol.to_string()));
        }

        let closes: Vec<f64> = body.data.bars.into_iter().map(|b| b.close).collect();
        debug!(symbol, count = closes.len(), "4h closes fetched");
        Ok(closes)
    }
}

impl std::fmt::Debug for CryptoCompareSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoCompareSource")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
