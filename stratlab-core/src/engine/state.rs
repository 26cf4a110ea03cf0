//! Run result and counters.

use serde::{Deserialize, Serialize};

use crate::domain::{EquitySample, Position, Trade};

/// Diagnostics collected while a run progresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub bars_processed: usize,
    pub signals_evaluated: usize,
    /// Entries dropped because the computed size was not positive.
    pub entries_skipped: usize,
    pub vetoes: usize,
    pub partial_fills: usize,
    /// Gateway orders that failed and aborted their operation.
    pub orders_rejected: usize,
    /// Exit orders the gateway filled only in part.
    #[serde(default)]
    pub partial_closes: usize,
}

/// Output of one lifecycle run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    pub trades: Vec<Trade>,
    /// One sample per processed primary candle.
    pub equity_curve: Vec<EquitySample>,
    pub counters: RunCounters,
    /// Set only when a gateway refused the final close.
    pub open_position: Option<Position>,
}

impl RunResult {
    pub fn empty() -> Self {
        Self::default()
    }
}
