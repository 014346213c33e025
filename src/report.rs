// =============================================================================
// Report Builder — RSI alert title, Markdown body and console summary
// =============================================================================
//
// Title, exactly:   RSI-{n}个超买,{m}个超卖信号
//   n = overbought readings across all assets and both periods
//   m = oversold readings, counted the same way
//
// Body sections:    heading, detection time, overbought table, oversold table,
//                   static legend.
//
// Table rows follow the configured asset order (RSI-14 before RSI-6 within an
// asset) and are never re-sorted by value, so identical inputs always render
// identical text.
// =============================================================================

use std::fmt::{Display, Write as _};

use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::types::{
    AssetReport, AssetStatus, RsiReading, SignalState, RSI_LONG_PERIOD, RSI_SHORT_PERIOD,
};

/// Explanatory footer appended to every alert.
pub const DEFAULT_LEGEND: &str = "\
**说明**

- RSI (相对强弱指数) 取值 0-100, 衡量近期上涨与下跌力度的对比。
- RSI-14 反映中期动能, RSI-6 对短期波动更敏感。
- 🔴 超买: 短期涨幅过快, 注意回调风险, 可考虑分批止盈、避免追高。
- 🟢 超卖: 短期跌幅过大, 可能出现技术性反弹, 可关注分批低吸机会。
- 以上仅为技术指标提示, 不构成投资建议。";

/// Rendered notification, built once per run after every asset is processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

/// Renders [`NotificationPayload`]s from per-asset reports.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    interval_label: String,
    legend: String,
}

impl ReportBuilder {
    pub fn new(interval_label: impl Into<String>, legend: impl Into<String>) -> Self {
        Self {
            interval_label: interval_label.into(),
            legend: legend.into(),
        }
    }

    /// Build title and body for the full, ordered set of reports.
    pub fn build<Tz>(&self, reports: &[AssetReport], generated_at: &DateTime<Tz>) -> NotificationPayload
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let (overbought, oversold) = signal_counts(reports);

        let mut body = String::new();
        let _ = writeln!(body, "## RSI {} 极值提醒", self.interval_label);
        body.push('\n');
        let _ = writeln!(body, "检测时间: {}", generated_at.format("%Y-%m-%d %H:%M:%S"));
        body.push('\n');

        let _ = writeln!(body, "### 🔴 {} (卖出信号)\n", SignalState::Overbought.label_zh());
        push_table(&mut body, reports, SignalState::Overbought);
        body.push('\n');

        let _ = writeln!(body, "### 🟢 {} (买入信号)\n", SignalState::Oversold.label_zh());
        push_table(&mut body, reports, SignalState::Oversold);
        body.push('\n');

        body.push_str("---\n\n");
        body.push_str(self.legend.trim_end());
        body.push('\n');

        NotificationPayload {
            title: render_title(overbought, oversold),
            body,
        }
    }
}

/// `(overbought, oversold)` reading counts across all reports.
pub fn signal_counts(reports: &[AssetReport]) -> (usize, usize) {
    reports.iter().fold((0, 0), |(ob, os), r| {
        (
            ob + r.count(SignalState::Overbought),
            os + r.count(SignalState::Oversold),
        )
    })
}

pub fn render_title(overbought: usize, oversold: usize) -> String {
    format!("RSI-{overbought}个超买,{oversold}个超卖信号")
}

fn push_table(body: &mut String, reports: &[AssetReport], state: SignalState) {
    let rows: Vec<(&AssetReport, &RsiReading)> = reports
        .iter()
        .flat_map(|r| r.readings().into_iter().map(move |reading| (r, reading)))
        .filter(|(_, reading)| reading.signal == Some(state))
        .collect();

    if rows.is_empty() {
        body.push_str("无\n");
        return;
    }

    body.push_str("| 币种 | 指标 | RSI | 最新价格 |\n");
    body.push_str("| :--- | :--- | ---: | ---: |\n");
    for (report, reading) in rows {
        let value = reading.value.map(|v| format!("{v:.2}")).unwrap_or_default();
        let price = report
            .latest_price
            .map(format_price)
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            body,
            "| {} | {} | {} | {} |",
            report.symbol,
            reading.indicator(),
            value,
            price
        );
    }
}

/// `$63,123.45` for prices of a dollar or more, `$0.0123` below that.
pub fn format_price(price: f64) -> String {
    if !price.is_finite() {
        return "-".to_string();
    }
    if price.abs() < 1.0 {
        return format!("${price:.4}");
    }

    let fixed = format!("{:.2}", price.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if price < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{frac_part}")
}

/// Plain-text results table printed at the end of a run.
pub fn render_summary(reports: &[AssetReport]) -> String {
    let rule = "=".repeat(50);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}\nRSI 结果摘要\n{rule}");

    for (slot, period) in [RSI_LONG_PERIOD, RSI_SHORT_PERIOD].into_iter().enumerate() {
        let _ = writeln!(out, "\nRSI-{period} Results:\n{}", "-".repeat(30));
        for report in reports {
            let reading = report.readings()[slot];
            match (reading.value, reading.signal) {
                (Some(v), Some(s)) if s != SignalState::Neutral => {
                    let _ = writeln!(out, "{:>8}: {:>6.2}  {}", report.symbol, v, s);
                }
                (Some(v), _) => {
                    let _ = writeln!(out, "{:>8}: {:>6.2}", report.symbol, v);
                }
                (None, _) => {
                    let _ = writeln!(out, "{:>8}: {}", report.symbol, undefined_reason(report));
                }
            }
        }
    }

    out
}

fn undefined_reason(report: &AssetReport) -> String {
    match &report.status {
        AssetStatus::Ok => "insufficient data".to_string(),
        other => other.to_string(),
    }
}
