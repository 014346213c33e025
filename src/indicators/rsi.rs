// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Price changes from consecutive closes.
// Step 2 — Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3 — Wilder smoothing for every later change:
//            avg_gain = (avg_gain * (period - 1) + gain) / period
//            avg_loss = (avg_loss * (period - 1) + loss) / period
// Step 4 — RS = avg_gain / avg_loss,  RSI = 100 - 100 / (1 + RS)
//
// A flat market (no gains and no losses) reads 50, not undefined.  RSI-14 and
// RSI-6 are always computed separately from the same closes.
// =============================================================================

/// Compute the full RSI series for `closes` (oldest first).
///
/// One value is produced per close starting at index `period`.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period + 1` => empty vec
/// - Non-finite input stops the series at the first non-finite value.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    let (seed_gain, seed_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| (g + gain(d), l + loss(d)));

    let mut avg_gain = seed_gain / period_f;
    let mut avg_loss = seed_loss / period_f;

    let mut series = Vec::with_capacity(deltas.len() - period + 1);
    match rsi_from_averages(avg_gain, avg_loss) {
        Some(first) => series.push(first),
        None => return series,
    }

    for &delta in &deltas[period..] {
        avg_gain = (avg_gain * (period_f - 1.0) + gain(delta)) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss(delta)) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => series.push(rsi),
            None => break,
        }
    }

    series
}

/// Most recent RSI value, or `None` when it is undefined.
///
/// Undefined covers a zero period, fewer than `period + 1` closes, and a
/// series that turned non-finite before reaching the last close.
pub fn compute_rsi(closes: &[f64], period: usize) -> Option<f64> {
    let series = calculate_rsi(closes, period);
    // A truncated series means the latest close never produced a value.
    if series.len() != closes.len().saturating_sub(period) {
        return None;
    }
    series.last().copied()
}

// =============================================================================
// Internal helpers
// =============================================================================

fn gain(delta: f64) -> f64 {
    if delta > 0.0 {
        delta
    } else {
        0.0
    }
}

fn loss(delta: f64) -> f64 {
    if delta > 0.0 {
        0.0
    } else {
        -delta
    }
}

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// - Both averages zero => 50.0 (flat market).
/// - Average loss zero  => 100.0 (only gains).
/// - Non-finite result  => `None`.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|x| x as f64).collect()
    }

    // ---- calculate_rsi ---------------------------------------------------

    #[test]
    fn series_empty_input() {
        assert!(calculate_rsi(&[], 14).is_empty());
    }

    #[test]
    fn series_period_zero() {
        assert!(calculate_rsi(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn series_length_matches_closes_minus_period() {
        let closes = ascending(30);
        assert_eq!(calculate_rsi(&closes, 14).len(), 16);
        assert_eq!(calculate_rsi(&closes, 6).len(), 24);
    }

    #[test]
    fn series_matches_wilder_reference() {
        // Wilder's classic 14-period worked example (avg gain 0.2386, avg loss 0.1000).
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28,
        ];
        let series = calculate_rsi(&closes, 14);
        assert_eq!(series.len(), 1);
        assert!((series[0] - 70.46).abs() < 0.01, "got {}", series[0]);
    }

    #[test]
    fn smoothing_uses_previous_average() {
        // period 2: deltas +2, -1, +1
        // seed: gain 1.0, loss 0.5        => RSI 66.67
        // next: gain (1.0 + 1) / 2 = 1.0, loss (0.5 + 0) / 2 = 0.25 => RSI 80
        let series = calculate_rsi(&[10.0, 12.0, 11.0, 12.0], 2);
        assert_eq!(series.len(), 2);
        assert!((series[0] - 200.0 / 3.0).abs() < 1e-9);
        assert!((series[1] - 80.0).abs() < 1e-9);
    }

    #[test]
    fn series_stops_on_non_finite_input() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 4.0];
        let series = calculate_rsi(&closes, 2);
        assert_eq!(series.len(), 1);
    }

    // ---- compute_rsi -----------------------------------------------------

    #[test]
    fn flat_market_reads_fifty_for_every_period() {
        let closes = vec![100.0; 30];
        for period in 1..=29 {
            let rsi = compute_rsi(&closes, period).unwrap();
            assert!((rsi - 50.0).abs() < 1e-10, "period {period}: {rsi}");
        }
    }

    #[test]
    fn strictly_increasing_reads_hundred() {
        for period in [1, 6, 14] {
            let closes = ascending(period + 1);
            let rsi = compute_rsi(&closes, period).unwrap();
            assert!((rsi - 100.0).abs() < 1e-10, "period {period}: {rsi}");
        }
        let rsi = compute_rsi(&ascending(60), 14).unwrap();
        assert!((rsi - 100.0).abs() < 1e-10);
    }

    #[test]
    fn strictly_decreasing_reads_zero() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let rsi = compute_rsi(&closes, 14).unwrap();
        assert!(rsi.abs() < 1e-10, "expected 0.0, got {rsi}");
    }

    #[test]
    fn short_series_is_undefined() {
        assert!(compute_rsi(&ascending(14), 14).is_none());
        assert!(compute_rsi(&ascending(6), 6).is_none());
        assert!(compute_rsi(&[], 6).is_none());
        // The same 10 closes are enough for period 6 but not period 14.
        let closes = ascending(10);
        assert!(compute_rsi(&closes, 6).is_some());
        assert!(compute_rsi(&closes, 14).is_none());
    }

    #[test]
    fn non_finite_tail_is_undefined() {
        let closes = vec![1.0, 2.0, 3.0, 2.0, f64::NAN];
        assert!(compute_rsi(&closes, 2).is_none());
    }

    #[test]
    fn values_stay_in_range() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13, 0.0, 1e9,
            0.5, 0.5, 3.0, 2.9999, 1e-9,
        ];
        for period in [1, 2, 6, 14] {
            for v in calculate_rsi(&closes, period) {
                assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
            }
        }
    }

    #[test]
    fn periods_are_computed_independently() {
        let closes = vec![
            10.0, 10.5, 10.2, 10.8, 11.0, 10.7, 10.9, 11.4, 11.1, 11.6, 11.3, 11.9,
            12.2, 11.8, 12.5, 12.1, 12.7,
        ];
        let r14 = compute_rsi(&closes, 14).unwrap();
        let r6 = compute_rsi(&closes, 6).unwrap();
        assert!((r14 - r6).abs() > 1e-6);
        assert_eq!(Some(r14), calculate_rsi(&closes, 14).last().copied());
        assert_eq!(Some(r6), calculate_rsi(&closes, 6).last().copied());
    }

    // ---- properties ------------------------------------------------------

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// A period together with strictly positive steps, at least `period` of them.
        fn period_and_steps() -> impl Strategy<Value = (usize, Vec<f64>)> {
            (1usize..40).prop_flat_map(|period| {
                (
                    Just(period),
                    prop::collection::vec(1e-3f64..1e3, period..period + 80),
                )
            })
        }

        proptest! {
            #[test]
            fn defined_rsi_is_always_in_range(
                closes in prop::collection::vec(0.0f64..1e9, 0..200),
                period in 1usize..40,
            ) {
                for v in calculate_rsi(&closes, period) {
                    prop_assert!((0.0..=100.0).contains(&v), "RSI {} out of range", v);
                }
                if let Some(v) = compute_rsi(&closes, period) {
                    prop_assert!((0.0..=100.0).contains(&v), "RSI {} out of range", v);
                }
            }

            #[test]
            fn constant_series_reads_fifty(
                price in 0.0f64..1e9,
                period in 1usize..50,
                extra in 0usize..50,
            ) {
                let closes = vec![price; period + 1 + extra];
                prop_assert_eq!(compute_rsi(&closes, period), Some(50.0));
            }

            #[test]
            fn strictly_increasing_series_reads_hundred(
                start in 0.0f64..1e6,
                (period, steps) in period_and_steps(),
            ) {
                let closes: Vec<f64> = std::iter::once(start)
                    .chain(steps.iter().scan(start, |price, step| {
                        *price += step;
                        Some(*price)
                    }))
                    .collect();
                prop_assert_eq!(compute_rsi(&closes, period), Some(100.0));
            }

            #[test]
            fn too_short_series_is_undefined(
                closes in prop::collection::vec(0.0f64..1e6, 0..40),
                extra in 0usize..10,
            ) {
                let period = closes.len() + extra;
                prop_assert_eq!(compute_rsi(&closes, period), None);
            }
        }
    }
}
