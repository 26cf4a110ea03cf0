//! Position lifecycle engine.
//!
//! [`LifecycleEngine`] owns the single open position of a run and is driven
//! one closed primary candle at a time. [`run_backtest`] feeds it a whole
//! historical series, splitting the management series into per-bar ticks.

pub mod gateway;
pub mod lifecycle;
pub mod sizing;
pub mod state;

pub use gateway::{GatewayError, OrderGateway, OrderReport, OrderSide};
pub use lifecycle::LifecycleEngine;
pub use sizing::{position_size, round_quantity};
pub use state::{RunCounters, RunResult};

use tracing::info;

use crate::config::BacktestConfig;
use crate::cooldown::ExhaustionCheck;
use crate::domain::Candle;
use crate::strategy::Strategy;

/// Primary candles plus an optional finer management series.
#[derive(Debug, Clone, Copy)]
pub struct MarketData<'a> {
    pub primary: &'a [Candle],
    /// Empty when intrabar realism is not needed; each primary candle is
    /// then its own single tick.
    pub management: &'a [Candle],
}

impl<'a> MarketData<'a> {
    pub fn new(primary: &'a [Candle], management: &'a [Candle]) -> Self {
        Self { primary, management }
    }

    pub fn primary_only(primary: &'a [Candle]) -> Self {
        Self {
            primary,
            management: &[],
        }
    }
}

/// Management ticks belonging to each primary candle: those with
/// `open_time` in `[open_i, open_{i+1})`, the last bar ending one primary
/// duration after its open.
pub fn partition_ticks<'a>(
    primary: &[Candle],
    management: &'a [Candle],
    bar_duration_ms: i64,
) -> Vec<&'a [Candle]> {
    let mut out = Vec::with_capacity(primary.len());
    let mut cursor = 0;
    for (i, candle) in primary.iter().enumerate() {
        let end = primary
            .get(i + 1)
            .map_or(candle.open_time + bar_duration_ms, |next| next.open_time);
        while cursor < management.len() && management[cursor].open_time < candle.open_time {
            cursor += 1;
        }
        let start = cursor;
        while cursor < management.len() && management[cursor].open_time < end {
            cursor += 1;
        }
        out.push(&management[start..cursor]);
    }
    out
}

/// Run a full historical backtest.
///
/// A primary series shorter than `config.min_history_bars` returns an empty
/// result without simulating anything.
pub fn run_backtest(
    data: MarketData<'_>,
    config: &BacktestConfig,
    strategy: &dyn Strategy,
    exhaustion: &dyn ExhaustionCheck,
) -> RunResult {
    if data.primary.len() < config.min_history_bars {
        info!(
            bars = data.primary.len(),
            required = config.min_history_bars,
            "not enough history, skipping run"
        );
        return RunResult::empty();
    }

    let ticks = partition_ticks(data.primary, data.management, config.timeframe.duration_ms());
    let mut engine = LifecycleEngine::new(config, strategy, exhaustion);
    for (candle, ticks) in data.primary.iter().zip(ticks) {
        engine.step(*candle, ticks);
    }
    engine.finish()
}
