//! StratLab Core: candles, position lifecycle, risk cap, cooldown veto, strategies.
//!
//! This crate contains the simulation itself:
//! - Domain types (candles, timeframes, positions, trades, equity samples)
//! - Run configuration with validation and content-addressed run ids
//! - Risk cap layer arbitrating strategy, user and hard-cap stops
//! - Post-profit cooldown with exhaustion veto
//! - Strategy trait, registry and reference strategies
//! - Lifecycle engine driven in bulk or one closed candle at a time

pub mod config;
pub mod cooldown;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod risk;
pub mod strategy;

pub use config::{BacktestConfig, ConfigError};
pub use cooldown::{ExhaustionCheck, RsiExhaustion};
pub use domain::{Candle, EquitySample, Position, Side, Timeframe, Trade};
pub use engine::{run_backtest, LifecycleEngine, MarketData, RunResult};
pub use strategy::{Strategy, StrategyRegistry};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with sweep worker threads are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::EquitySample>();
        require_sync::<domain::EquitySample>();

        require_send::<config::BacktestConfig>();
        require_sync::<config::BacktestConfig>();
        require_send::<engine::RunResult>();
        require_sync::<engine::RunResult>();

        require_send::<strategy::StrategyRegistry>();
        require_sync::<strategy::StrategyRegistry>();
        require_send::<Box<dyn strategy::Strategy>>();
        require_sync::<Box<dyn strategy::Strategy>>();
        require_send::<cooldown::RsiExhaustion>();
        require_sync::<cooldown::RsiExhaustion>();
    }

    /// Strategies receive candles and configuration only; the engine's
    /// position is visible solely through `manage`.
    #[test]
    fn generate_takes_no_engine_state() {
        fn _check_trait_object_builds(
            strategy: &dyn Strategy,
            history: &[Candle],
            config: &BacktestConfig,
        ) -> strategy::SignalOutput {
            strategy.generate(history, Timeframe::H1, config, None)
        }
    }
}
