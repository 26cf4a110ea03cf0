//! Backtest runner: wires together configuration, strategy registry,
//! lifecycle engine and performance report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use stratlab_core::config::{BacktestConfig, ConfigError, ExecutionMode, RunId};
use stratlab_core::cooldown::{ExhaustionCheck, RsiExhaustion};
use stratlab_core::domain::{EquitySample, Trade};
use stratlab_core::engine::{run_backtest, MarketData, RunCounters};
use stratlab_core::strategy::{RegistryError, Strategy, StrategyRegistry};

use crate::metrics::PerformanceReport;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("strategy error: {0}")]
    Registry(#[from] RegistryError),
    #[error("live execution mode cannot be backtested")]
    LiveMode,
}

/// Current schema version for persisted results.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub strategy_id: u32,
    pub strategy_name: String,
    pub params: BTreeMap<String, f64>,
    pub report: PerformanceReport,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquitySample>,
    pub counters: RunCounters,
    pub bar_count: usize,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Validate `config`, build its strategy from `registry` and run it over `data`.
pub fn run_single(
    data: MarketData<'_>,
    config: &BacktestConfig,
    registry: &StrategyRegistry,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    if config.execution_mode == ExecutionMode::Live {
        return Err(RunError::LiveMode);
    }
    let strategy = registry.build(config.strategy_id, &config.params)?;
    let exhaustion = RsiExhaustion::new(&config.exhaustion);
    Ok(simulate(data, config, &*strategy, &exhaustion))
}

/// Run an already-built strategy. `config` is assumed valid.
pub fn simulate(
    data: MarketData<'_>,
    config: &BacktestConfig,
    strategy: &dyn Strategy,
    exhaustion: &dyn ExhaustionCheck,
) -> BacktestResult {
    let run = run_backtest(data, config, strategy, exhaustion);
    let report = PerformanceReport::compute(&run.trades, &run.equity_curve, config.investment);
    debug!(
        strategy = strategy.name(),
        trades = report.total_trades,
        pnl = report.total_pnl,
        "run complete"
    );

    BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id(),
        strategy_id: config.strategy_id,
        strategy_name: strategy.name().to_string(),
        params: config.params.clone(),
        report,
        trades: run.trades,
        equity_curve: run.equity_curve,
        counters: run.counters,
        bar_count: data.primary.len(),
    }
}
