// =============================================================================
// Pipeline — one full RSI alert run
// =============================================================================
//
// For each configured asset, strictly in order:
//   fetch closes (fetch retry policy) -> RSI-14 + RSI-6 -> classify
// with a fixed pause between consecutive assets (none after the last).
//
// A fetch failure only affects its own asset: the asset is reported with
// undefined readings and the run moves on.  Once every asset is processed a
// single payload is built and handed to the dispatcher.  Runs without any
// overbought/oversold reading are not sent unless `notify_when_quiet` is set.
// =============================================================================

use chrono::Local;
use tracing::{error, info, warn};

use crate::indicators::compute_rsi;
use crate::market_data::{PriceSeriesSource, RetrievalError};
use crate::notify::{delivered_any, DeliveryOutcome, NotificationDispatcher};
use crate::report::{NotificationPayload, ReportBuilder};
use crate::retry::attempt_with_retry_when;
use crate::runtime_config::{AppConfig, AssetConfig};
use crate::signals::{classify, SignalThresholds};
use crate::types::{AssetReport, AssetStatus, RsiReading, RSI_LONG_PERIOD, RSI_SHORT_PERIOD};

/// Everything a run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// One report per configured asset, in configured order.
    pub reports: Vec<AssetReport>,
    pub payload: NotificationPayload,
    /// Empty when the run was quiet and not dispatched.
    pub outcomes: Vec<DeliveryOutcome>,
}

impl RunSummary {
    pub fn dispatched(&self) -> bool {
        !self.outcomes.is_empty()
    }

    pub fn delivered(&self) -> bool {
        delivered_any(&self.outcomes)
    }
}

pub struct Pipeline<'a> {
    config: &'a AppConfig,
    source: &'a dyn PriceSeriesSource,
    dispatcher: &'a NotificationDispatcher,
    builder: ReportBuilder,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a AppConfig,
        source: &'a dyn PriceSeriesSource,
        dispatcher: &'a NotificationDispatcher,
    ) -> Self {
        let builder = ReportBuilder::new(config.interval_label(), config.report.legend.clone());
        Self {
            config,
            source,
            dispatcher,
            builder,
        }
    }

    pub async fn run(&self) -> RunSummary {
        let reports = self.collect_reports().await;
        let payload = self.builder.build(&reports, &Local::now());

        let has_signal = reports.iter().any(AssetReport::has_extreme);
        let outcomes = if has_signal || self.config.notify_when_quiet {
            self.dispatcher
                .dispatch(&payload, &self.config.endpoints, &self.config.delivery_retry)
                .await
        } else {
            info!(title = %payload.title, "no overbought or oversold readings, notification skipped");
            Vec::new()
        };

        if !outcomes.is_empty() && !delivered_any(&outcomes) {
            error!(
                providers = outcomes.len(),
                "alert was not delivered by any provider"
            );
        }

        RunSummary {
            reports,
            payload,
            outcomes,
        }
    }

    /// Fetch and evaluate every asset sequentially.
    pub async fn collect_reports(&self) -> Vec<AssetReport> {
        let assets = &self.config.assets;
        let delay = self.config.asset_delay();
        let mut reports = Vec::with_capacity(assets.len());

        info!(
            source = self.source.name(),
            assets = assets.len(),
            lookback = self.config.lookback(),
            "processing assets"
        );

        for (idx, asset) in assets.iter().enumerate() {
            info!(symbol = %asset.symbol, progress = %format!("{}/{}", idx + 1, assets.len()), "processing asset");
            reports.push(self.process_asset(asset).await);

            if idx + 1 < assets.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        reports
    }

    async fn process_asset(&self, asset: &AssetConfig) -> AssetReport {
        let lookback = self.config.lookback();
        let attempted = attempt_with_retry_when(
            &self.config.fetch_retry,
            &asset.symbol,
            || self.source.fetch_closes(asset, lookback),
            |e: &RetrievalError| e.is_transient(),
        )
        .await;

        match attempted.result {
            Ok(closes) => {
                let report = evaluate_series(&asset.symbol, &closes, &self.config.thresholds);
                if report.status == AssetStatus::InsufficientData {
                    warn!(symbol = %asset.symbol, closes = closes.len(), "not enough closes for RSI");
                }
                report
            }
            Err(e) => {
                error!(
                    symbol = %asset.symbol,
                    attempts = attempted.attempts,
                    error = %e,
                    "price fetch failed, skipping asset"
                );
                AssetReport::fetch_failed(&asset.symbol, e.to_string())
            }
        }
    }
}

/// Compute and classify both RSI readings for one close series.
pub fn evaluate_series(symbol: &str, closes: &[f64], thresholds: &SignalThresholds) -> AssetReport {
    let reading = |period: usize| {
        let value = compute_rsi(closes, period);
        RsiReading {
            period,
            value,
            signal: classify(value, period, thresholds),
        }
    };

    let rsi_14 = reading(RSI_LONG_PERIOD);
    let rsi_6 = reading(RSI_SHORT_PERIOD);
    let status = if rsi_14.value.is_some() && rsi_6.value.is_some() {
        AssetStatus::Ok
    } else {
        AssetStatus::InsufficientData
    };

    AssetReport {
        symbol: symbol.to_string(),
        rsi_14,
        rsi_6,
        latest_price: closes.last().copied().filter(|p| p.is_finite()),
        status,
    }
}
