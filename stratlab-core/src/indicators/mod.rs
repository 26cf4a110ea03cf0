//! Indicators over candle history.
//!
//! Indicators are pure functions: candle history in, numeric series out, same
//! length as the input. The first `lookback()` values are `f64::NAN` (warmup).
//! No value at index t may depend on candles after t.

use crate::domain::Candle;

pub mod atr;
pub mod donchian;
pub mod ema;
pub mod rsi;
pub mod sma;

pub use atr::{true_range, wilder_smooth, Atr};
pub use donchian::{Donchian, DonchianBand};
pub use ema::{ema_of_series, Ema};
pub use rsi::Rsi;
pub use sma::Sma;

pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire series.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;

    /// Value at the last candle, if past warmup.
    fn latest(&self, candles: &[Candle]) -> Option<f64> {
        self.compute(candles).last().copied().filter(|v| v.is_finite())
    }
}

/// Synthetic candles from close prices for tests.
///
/// open = previous close (or close for the first candle),
/// high = max(open, close) + 1, low = min(open, close) - 1, one minute apart.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                i as i64 * 60_000,
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn make_ohlc(data: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| {
            Candle::new(i as i64 * 60_000, open, high, low, close, 1000.0)
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
