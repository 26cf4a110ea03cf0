//! StratLab Runner: performance reports, run orchestration, parameter sweeps.
//!
//! This crate builds on `stratlab-core` to provide:
//! - Performance report over trades and equity samples
//! - Single-run orchestration with validation and strategy lookup
//! - Parallel grid search with progress, cancellation and ranking
//! - TOML run files, CSV and synthetic candle loading
//! - JSON and CSV export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{DataConfig, RunFile, RunFileError};
pub use data_loader::{load, LoadError, LoadedData};
pub use export::{export_equity_csv, export_json, export_trades_csv, import_json, ExportError};
pub use metrics::PerformanceReport;
pub use runner::{run_single, simulate, BacktestResult, RunError};
pub use sweep::{
    run_sweep, ParamAxis, SweepConfig, SweepError, SweepOutcome, SweepProgress,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn performance_report_is_send_sync() {
        assert_send::<PerformanceReport>();
        assert_sync::<PerformanceReport>();
    }

    #[test]
    fn backtest_result_is_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn run_error_is_send() {
        assert_send::<RunError>();
    }

    #[test]
    fn sweep_types_are_send_sync() {
        assert_send::<SweepConfig>();
        assert_sync::<SweepConfig>();
        assert_send::<SweepOutcome>();
        assert_sync::<SweepOutcome>();
        assert_send::<ParamAxis>();
        assert_sync::<ParamAxis>();
    }

    #[test]
    fn run_file_is_send_sync() {
        assert_send::<RunFile>();
        assert_sync::<RunFile>();
        assert_send::<LoadedData>();
        assert_sync::<LoadedData>();
    }
}
