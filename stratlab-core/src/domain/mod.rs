//! Domain types for StratLab

pub mod candle;
pub mod equity;
pub mod position;
pub mod trade;

pub use candle::{completed_buckets, resample, validate_series, Candle, CandleError, Timeframe};
pub use equity::EquitySample;
pub use position::{Position, Side, StopReason, TpRung};
pub use trade::{ExitReason, Trade};
