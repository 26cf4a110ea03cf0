//! Trade: a completed round trip, created exactly when a position closes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::{Side, StopReason};
use crate::config::MarginType;

/// Why a position closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
    StrategyClose,
    EndOfBacktest,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExitReason::StopLoss => "Stop Loss Hit",
            ExitReason::TrailingStop => "Trailing Stop Hit",
            ExitReason::TakeProfit => "Take Profit Hit",
            ExitReason::StrategyClose => "Closed by Strategy",
            ExitReason::EndOfBacktest => "End of backtest",
        };
        f.write_str(text)
    }
}

/// A closed position snapshot plus exit details and net PnL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Position snapshot ──
    pub side: Side,
    pub entry_time: i64,
    pub entry_price: f64,
    /// Initial size, before any partial take-profit.
    pub size: f64,
    pub leverage: f64,
    pub invested_amount: f64,
    pub margin_type: MarginType,
    pub initial_stop_loss: f64,
    pub initial_take_profit: Option<f64>,
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub stop_reason: StopReason,
    pub partial_fills: usize,

    // ── Exit ──
    pub exit_time: i64,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── PnL ──
    pub gross_pnl: f64,
    pub fees: f64,
    /// Net PnL: gross minus all fees, partial fills included.
    pub pnl: f64,

    // ── Rationale ──
    pub entry_rationale: String,
    pub exit_rationale: String,
}

impl Trade {
    pub fn duration_ms(&self) -> i64 {
        self.exit_time - self.entry_time
    }

    /// Net PnL as a fraction of the capital committed.
    pub fn return_on_investment(&self) -> f64 {
        if self.invested_amount == 0.0 {
            return 0.0;
        }
        self.pnl / self.invested_amount
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl < 0.0
    }
}
