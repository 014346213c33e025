// =============================================================================
// Runtime Configuration — one immutable AppConfig per run
// =============================================================================
//
// Built once at startup from (in order):
//   1. built-in defaults
//   2. an optional JSON file (`RSI_CONFIG`, default `rsi_config.json`)
//   3. environment overrides (`RSI_SOURCE`, `RSI_ASSETS`, `CC_API_KEY`,
//      `RSI_SERVERCHAN_TOKEN`, `RSI_PUSH_UID` + `RSI_PUSH_SENDKEY`)
//
// then validated and passed by reference.  Nothing downstream reads the
// environment.  All fields carry `#[serde(default)]` so that a partial file
// always loads.
//
// SECURITY: notification credentials and the CryptoCompare key never appear
// in Debug output.
// =============================================================================

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::market_data::coingecko::COINGECKO_BASE_URL;
use crate::market_data::cryptocompare::CRYPTOCOMPARE_BASE_URL;
use crate::notify::ProviderEndpoint;
use crate::report::DEFAULT_LEGEND;
use crate::retry::RetryPolicy;
use crate::signals::SignalThresholds;
use crate::types::{RSI_LONG_PERIOD, RSI_SHORT_PERIOD};

/// Default config file looked up when `RSI_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "rsi_config.json";

/// Invalid configuration.  Always fatal, raised before any asset is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no assets configured")]
    NoAssets,

    #[error("asset #{index} has a blank symbol")]
    BlankSymbol { index: usize },

    #[error("no notification endpoints configured")]
    NoEndpoints,

    #[error("notification provider {provider:?} has a malformed URL template: {reason}")]
    MalformedTemplate { provider: String, reason: String },

    #[error("notification provider {provider:?} is missing credential {field:?}")]
    MissingCredential { provider: String, field: String },

    #[error("RSI-{period} thresholds must satisfy 0 <= oversold < overbought <= 100")]
    InvalidThresholds { period: usize },

    #[error("lookback of {lookback} periods cannot define RSI (need at least {required})")]
    InsufficientLookback { lookback: u32, required: u32 },

    #[error("{which} retry policy is invalid: {reason}")]
    InvalidRetryPolicy { which: &'static str, reason: String },
}

// =============================================================================
// Assets and sources
// =============================================================================

/// One tracked asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Display symbol, also the CryptoCompare `fsym`.
    pub symbol: String,

    /// CoinGecko coin id.  Falls back to the lowercase symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl AssetConfig {
    pub fn new(symbol: &str, id: Option<&str>) -> Self {
        Self {
            symbol: symbol.to_string(),
            id: id.map(str::to_string),
        }
    }

    pub fn coin_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| self.symbol.to_lowercase())
    }
}

/// Where closes come from.  Each source carries its own candle interval and
/// rate-limit friendly defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Daily closes.
    #[default]
    CoinGecko,
    /// 4-hour closes.
    CryptoCompare,
}

impl SourceKind {
    /// Days (CoinGecko) or candles (CryptoCompare) requested per asset.
    pub fn default_lookback(self) -> u32 {
        match self {
            Self::CoinGecko => 30,
            Self::CryptoCompare => 100,
        }
    }

    /// Pause between consecutive assets.
    pub fn default_asset_delay_secs(self) -> u64 {
        match self {
            Self::CoinGecko => 20,
            Self::CryptoCompare => 5,
        }
    }

    pub fn interval_label(self) -> &'static str {
        match self {
            Self::CoinGecko => "1d",
            Self::CryptoCompare => "4h",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CoinGecko => write!(f, "coingecko"),
            Self::CryptoCompare => write!(f, "cryptocompare"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coingecko" => Ok(Self::CoinGecko),
            "cryptocompare" => Ok(Self::CryptoCompare),
            other => bail!("unknown price source {other:?} (expected coingecko or cryptocompare)"),
        }
    }
}

/// Report text settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_legend")]
    pub legend: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            legend: default_legend(),
        }
    }
}

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_legend() -> String {
    DEFAULT_LEGEND.to_string()
}

fn default_assets() -> Vec<AssetConfig> {
    [
        ("BTC", "bitcoin"),
        ("ETH", "ethereum"),
        ("BNB", "binancecoin"),
        ("SOL", "solana"),
        ("JLP", "jupiter-perpetuals-liquidity-provider-token"),
        ("PENDLE", "pendle"),
        ("PENPIE", "penpie"),
        ("EQB", "equilibria-finance"),
        ("SUI", "sui"),
        ("APT", "aptos"),
        ("DEEP", "deep"),
        ("WAL", "walrus-2"),
        ("BGB", "bitget-token"),
        ("MNT", "mantle"),
        ("SPK", "spark-2"),
        ("WLD", "worldcoin-wld"),
        ("ENA", "ethena"),
    ]
    .into_iter()
    .map(|(symbol, id)| AssetConfig::new(symbol, Some(id)))
    .collect()
}

fn default_fetch_retry() -> RetryPolicy {
    RetryPolicy::exponential(
        2,
        Duration::from_secs(1),
        Duration::from_secs(2),
        Duration::from_secs(30),
    )
}

fn default_delivery_retry() -> RetryPolicy {
    RetryPolicy::constant(2, Duration::from_secs(2), Duration::from_secs(30))
}

fn default_coingecko_base_url() -> String {
    COINGECKO_BASE_URL.to_string()
}

fn default_cryptocompare_base_url() -> String {
    CRYPTOCOMPARE_BASE_URL.to_string()
}

// =============================================================================
// AppConfig
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // --- Data -------------------------------------------------------------

    #[serde(default)]
    pub source: SourceKind,

    /// Processed and reported in this order.
    #[serde(default = "default_assets")]
    pub assets: Vec<AssetConfig>,

    /// Overrides the source's default lookback.
    #[serde(default)]
    pub lookback: Option<u32>,

    /// Overrides the source's default pause between assets.
    #[serde(default)]
    pub asset_delay_secs: Option<u64>,

    /// Overrides the source's interval label in the alert heading.
    #[serde(default)]
    pub interval_label: Option<String>,

    #[serde(default, skip_serializing)]
    pub cryptocompare_api_key: Option<String>,

    #[serde(default = "default_coingecko_base_url")]
    pub coingecko_base_url: String,

    #[serde(default = "default_cryptocompare_base_url")]
    pub cryptocompare_base_url: String,

    // --- Signals ----------------------------------------------------------

    #[serde(default)]
    pub thresholds: SignalThresholds,

    // --- Notification -----------------------------------------------------

    #[serde(default)]
    pub endpoints: Vec<ProviderEndpoint>,

    /// Send the alert even when no asset is overbought or oversold.
    #[serde(default)]
    pub notify_when_quiet: bool,

    #[serde(default)]
    pub report: ReportConfig,

    // --- Retry ------------------------------------------------------------

    #[serde(default = "default_fetch_retry")]
    pub fetch_retry: RetryPolicy,

    #[serde(default = "default_delivery_retry")]
    pub delivery_retry: RetryPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            assets: default_assets(),
            lookback: None,
            asset_delay_secs: None,
            interval_label: None,
            cryptocompare_api_key: None,
            coingecko_base_url: default_coingecko_base_url(),
            cryptocompare_base_url: default_cryptocompare_base_url(),
            thresholds: SignalThresholds::default(),
            endpoints: Vec::new(),
            notify_when_quiet: false,
            report: ReportConfig::default(),
            fetch_retry: default_fetch_retry(),
            delivery_retry: default_delivery_retry(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("source", &self.source)
            .field("assets", &self.assets)
            .field("lookback", &self.lookback())
            .field("asset_delay", &self.asset_delay())
            .field("interval_label", &self.interval_label())
            .field(
                "cryptocompare_api_key",
                &self.cryptocompare_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("thresholds", &self.thresholds)
            .field("endpoints", &self.endpoints)
            .field("notify_when_quiet", &self.notify_when_quiet)
            .field("fetch_retry", &self.fetch_retry)
            .field("delivery_retry", &self.delivery_retry)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            source = %config.source,
            assets = config.assets.len(),
            endpoints = config.endpoints.len(),
            "config loaded"
        );

        Ok(config)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    /// A file that exists and fails to parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Fold environment overrides into the config.  `var` is the lookup
    /// (`std::env::var(..).ok()` in production); empty values are ignored.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(source) = var("RSI_SOURCE") {
            self.source = source.parse::<SourceKind>().context("invalid RSI_SOURCE")?;
        }

        if let Some(list) = var("RSI_ASSETS") {
            self.assets = parse_asset_list(&list);
        }

        if let Some(key) = var("CC_API_KEY") {
            self.cryptocompare_api_key = Some(key.trim().to_string());
        }

        if let Some(token) = var("RSI_SERVERCHAN_TOKEN") {
            self.endpoints
                .push(ProviderEndpoint::single_token("serverchan", token.trim()));
        }

        match (var("RSI_PUSH_UID"), var("RSI_PUSH_SENDKEY")) {
            (Some(uid), Some(send_key)) => {
                self.endpoints.push(ProviderEndpoint::user_and_key(
                    "serverchan3",
                    uid.trim(),
                    send_key.trim(),
                ));
            }
            (None, None) => {}
            _ => warn!("RSI_PUSH_UID and RSI_PUSH_SENDKEY must be set together, ignoring"),
        }

        Ok(())
    }

    /// Reject configurations that could never produce a useful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.is_empty() {
            return Err(ConfigError::NoAssets);
        }
        if let Some(index) = self.assets.iter().position(|a| a.symbol.trim().is_empty()) {
            return Err(ConfigError::BlankSymbol { index });
        }
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }

        for period in [RSI_LONG_PERIOD, RSI_SHORT_PERIOD] {
            let valid = self
                .thresholds
                .for_period(period)
                .is_some_and(|t| t.is_valid());
            if !valid {
                return Err(ConfigError::InvalidThresholds { period });
            }
        }

        for (which, policy) in [("fetch", &self.fetch_retry), ("delivery", &self.delivery_retry)] {
            policy
                .validate()
                .map_err(|reason| ConfigError::InvalidRetryPolicy { which, reason })?;
        }

        // `lookback` periods yield `lookback + 1` closes; RSI-14 needs 15.
        let required = RSI_LONG_PERIOD as u32;
        if self.lookback() < required {
            return Err(ConfigError::InsufficientLookback {
                lookback: self.lookback(),
                required,
            });
        }

        Ok(())
    }

    pub fn lookback(&self) -> u32 {
        self.lookback
            .unwrap_or_else(|| self.source.default_lookback())
    }

    pub fn asset_delay(&self) -> Duration {
        Duration::from_secs(
            self.asset_delay_secs
                .unwrap_or_else(|| self.source.default_asset_delay_secs()),
        )
    }

    pub fn interval_label(&self) -> &str {
        self.interval_label
            .as_deref()
            .unwrap_or_else(|| self.source.interval_label())
    }
}

/// `BTC,ETH:ethereum,sol` => symbols upper-cased; ids taken from the entry
/// or, for well-known symbols, from the default asset list.
fn parse_asset_list(list: &str) -> Vec<AssetConfig> {
    let known = default_assets();
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (symbol, id) = match entry.split_once(':') {
                Some((symbol, id)) => (symbol.trim(), Some(id.trim())),
                None => (entry, None),
            };
            let symbol = symbol.to_ascii_uppercase();
            let id = id.filter(|id| !id.is_empty()).map(str::to_string).or_else(|| {
                known
                    .iter()
                    .find(|a| a.symbol == symbol)
                    .and_then(|a| a.id.clone())
            });
            AssetConfig { symbol, id }
        })
        .collect()
}
