// =============================================================================
// Market Data Module — historical closing prices per asset
// =============================================================================
//
// A `PriceSeriesSource` turns an asset plus a lookback length into closes
// ordered oldest -> newest.  Two REST sources are provided:
//
//   1. CoinGecko      — daily closes, addressed by coin id
//   2. CryptoCompare  — 4-hour closes, addressed by symbol
//
// Sources make exactly one HTTP request per call; retries belong to the
// caller's fetch policy.

pub mod coingecko;
pub mod cryptocompare;

pub use coingecko::CoinGeckoSource;
pub use cryptocompare::CryptoCompareSource;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::runtime_config::{AppConfig, AssetConfig, SourceKind};

/// Failure to obtain a usable price series for one asset.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("price API returned HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("price API reported an error: {0}")]
    Provider(String),

    #[error("failed to decode price response: {0}")]
    Decode(String),

    #[error("no price data returned for {0}")]
    Empty(String),
}

impl RetrievalError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Provider(_) => true,
            Self::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            Self::Decode(_) | Self::Empty(_) => false,
        }
    }
}

/// Black-box provider of historical closing prices.
#[async_trait]
pub trait PriceSeriesSource: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Fetch up to `lookback` periods of closes for `asset`, oldest first.
    async fn fetch_closes(
        &self,
        asset: &AssetConfig,
        lookback: u32,
    ) -> Result<Vec<f64>, RetrievalError>;
}

/// Build the configured price source with a client whose timeout matches the
/// fetch policy.
pub fn build_source(config: &AppConfig) -> Result<Box<dyn PriceSeriesSource>> {
    let client = reqwest::Client::builder()
        .timeout(config.fetch_retry.timeout())
        .build()
        .context("failed to build HTTP client for price source")?;

    let source: Box<dyn PriceSeriesSource> = match config.source {
        SourceKind::CoinGecko => Box::new(CoinGeckoSource::with_client(
            config.coingecko_base_url.clone(),
            client,
        )),
        SourceKind::CryptoCompare => Box::new(CryptoCompareSource::with_client(
            config.cryptocompare_base_url.clone(),
            config.cryptocompare_api_key.clone(),
            client,
        )),
    };

    debug!(source = source.name(), "price source initialised");
    Ok(source)
}

/// Send `request` and decode a JSON body, mapping every failure into a
/// [`RetrievalError`].
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, RetrievalError> {
    let resp = request
        .send()
        .await
        .map_err(|e| RetrievalError::Http(e.without_url()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(RetrievalError::Status {
            status,
            body: truncate(&body, 200),
        });
    }

    let text = resp
        .text()
        .await
        .map_err(|e| RetrievalError::Http(e.without_url()))?;

    serde_json::from_str(&text).map_err(|e| RetrievalError::Decode(e.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(RetrievalError::Provider("rate limit".into()).is_transient());
        assert!(RetrievalError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        }
        .is_transient());
        assert!(RetrievalError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        }
        .is_transient());
        assert!(!RetrievalError::Status {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        }
        .is_transient());
        assert!(!RetrievalError::Empty("BTC".into()).is_transient());
        assert!(!RetrievalError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("超买超卖", 2), "超买");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
