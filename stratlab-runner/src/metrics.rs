//! Performance report: a pure reducer over trades and equity samples.
//!
//! Every metric is a pure function: trade list and/or equity samples in,
//! scalar out. Degenerate inputs produce sentinels (0 or +inf), never errors.

use serde::{Deserialize, Serialize};
use stratlab_core::domain::{EquitySample, Trade};

/// Aggregate statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub break_evens: usize,
    /// Percent of trades with positive net PnL.
    pub win_rate: f64,
    pub total_pnl: f64,
    pub gross_profit: f64,
    /// Sum of losing trades' PnL (zero or negative).
    pub gross_loss: f64,
    /// `+inf` when there are profits and no losses.
    #[serde(with = "profit_factor_serde")]
    pub profit_factor: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Largest peak-to-trough equity decline, in currency.
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub average_trade_duration: String,
    pub average_trade_duration_ms: i64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub total_fees: f64,
    pub final_equity: f64,
    pub return_pct: f64,
}

impl PerformanceReport {
    /// Report for a run that produced no trades.
    ///
    /// Equity stays at the starting capital; everything else is zero.
    pub fn empty(starting_capital: f64) -> Self {
        Self {
            total_trades: 0,
            wins: 0,
            losses: 0,
            break_evens: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            profit_factor: 0.0,
            average_win: 0.0,
            average_loss: 0.0,
            largest_win: 0.0,
            largest_loss: 0.0,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            sharpe_ratio: 0.0,
            average_trade_duration: "N/A".to_string(),
            average_trade_duration_ms: 0,
            max_consecutive_wins: 0,
            max_consecutive_losses: 0,
            total_fees: 0.0,
            final_equity: starting_capital,
            return_pct: 0.0,
        }
    }

    /// Compute the full report.
    pub fn compute(trades: &[Trade], equity_curve: &[EquitySample], starting_capital: f64) -> Self {
        if trades.is_empty() {
            return Self::empty(starting_capital);
        }

        let (wins, losses, break_evens) = outcome_counts(trades);
        let total_pnl = total_pnl(trades);
        let final_equity = starting_capital + total_pnl;
        let duration_ms = average_duration_ms(trades);
        let (max_drawdown, max_drawdown_pct) = max_drawdown(equity_curve, starting_capital);

        Self {
            total_trades: trades.len(),
            wins,
            losses,
            break_evens,
            win_rate: win_rate(trades),
            total_pnl,
            gross_profit: gross_profit(trades),
            gross_loss: gross_loss(trades),
            profit_factor: profit_factor(trades),
            average_win: mean_f64(&pnls(trades, |p| p > 0.0)),
            average_loss: mean_f64(&pnls(trades, |p| p < 0.0)),
            largest_win: trades.iter().map(|t| t.pnl).fold(0.0, f64::max),
            largest_loss: trades.iter().map(|t| t.pnl).fold(0.0, f64::min),
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio: sharpe_ratio(trades),
            average_trade_duration: format_duration(duration_ms),
            average_trade_duration_ms: duration_ms,
            max_consecutive_wins: max_consecutive(trades, true),
            max_consecutive_losses: max_consecutive(trades, false),
            total_fees: trades.iter().map(|t| t.fees).sum(),
            final_equity,
            return_pct: if starting_capital > 0.0 {
                (final_equity - starting_capital) / starting_capital * 100.0
            } else {
                0.0
            },
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn total_pnl(trades: &[Trade]) -> f64 {
    trades.iter().map(|t| t.pnl).sum()
}

/// (wins, losses, break-evens) by sign of net PnL.
pub fn outcome_counts(trades: &[Trade]) -> (usize, usize, usize) {
    trades.iter().fold((0, 0, 0), |(w, l, b), t| {
        if t.is_winner() {
            (w + 1, l, b)
        } else if t.is_loser() {
            (w, l + 1, b)
        } else {
            (w, l, b + 1)
        }
    })
}

/// Win rate in percent.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let (wins, _, _) = outcome_counts(trades);
    wins as f64 / trades.len() as f64 * 100.0
}

pub fn gross_profit(trades: &[Trade]) -> f64 {
    pnls(trades, |p| p > 0.0).iter().sum()
}

pub fn gross_loss(trades: &[Trade]) -> f64 {
    pnls(trades, |p| p < 0.0).iter().sum()
}

/// Gross profit over absolute gross loss.
///
/// `+inf` with profits and no losses; 0 with neither.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let profit = gross_profit(trades);
    let loss = gross_loss(trades).abs();
    if loss == 0.0 {
        return if profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    profit / loss
}

/// Largest peak-to-trough decline as (currency, percent of peak).
///
/// The starting capital is the initial peak.
pub fn max_drawdown(equity_curve: &[EquitySample], starting_capital: f64) -> (f64, f64) {
    let mut peak = starting_capital;
    let mut max_dd = 0.0_f64;
    let mut max_dd_pct = 0.0_f64;

    for sample in equity_curve {
        if sample.equity > peak {
            peak = sample.equity;
        }
        let dd = peak - sample.equity;
        if dd > max_dd {
            max_dd = dd;
        }
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max(dd / peak * 100.0);
        }
    }
    (max_dd, max_dd_pct)
}

/// Mean over sample standard deviation of per-trade return on invested
/// capital. 0 when the deviation is zero (including fewer than two trades).
pub fn sharpe_ratio(trades: &[Trade]) -> f64 {
    let returns: Vec<f64> = trades.iter().map(Trade::return_on_investment).collect();
    let sd = std_dev(&returns);
    if sd == 0.0 || !sd.is_finite() {
        return 0.0;
    }
    mean_f64(&returns) / sd
}

pub fn average_duration_ms(trades: &[Trade]) -> i64 {
    if trades.is_empty() {
        return 0;
    }
    let total: i64 = trades.iter().map(Trade::duration_ms).sum();
    (total as f64 / trades.len() as f64).round() as i64
}

/// Whole count of the coarsest unit that fits: "2 days", "5 hours",
/// "1 minute", "30 seconds".
pub fn format_duration(ms: i64) -> String {
    const UNITS: [(i64, &str); 4] = [
        (86_400_000, "day"),
        (3_600_000, "hour"),
        (60_000, "minute"),
        (1_000, "second"),
    ];
    for (unit_ms, name) in UNITS {
        let count = ms / unit_ms;
        if count >= 1 {
            let suffix = if count == 1 { "" } else { "s" };
            return format!("{count} {name}{suffix}");
        }
    }
    "0 seconds".to_string()
}

pub fn max_consecutive_wins(trades: &[Trade]) -> usize {
    max_consecutive(trades, true)
}

pub fn max_consecutive_losses(trades: &[Trade]) -> usize {
    max_consecutive(trades, false)
}

// ─── Helpers ────────────────────────────────────────────────────────

fn pnls(trades: &[Trade], keep: impl Fn(f64) -> bool) -> Vec<f64> {
    trades.iter().map(|t| t.pnl).filter(|&p| keep(p)).collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Longest run of winners (`winners = true`) or losers. Break-evens end both.
fn max_consecutive(trades: &[Trade], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;

    for trade in trades {
        let hit = if winners {
            trade.pnl > 0.0
        } else {
            trade.pnl < 0.0
        };
        if hit {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

/// `+inf` serializes as the string `"inf"` so reports stay valid JSON.
mod profit_factor_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if *value == f64::INFINITY {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) if matches!(text.as_str(), "inf" | "Infinity" | "+inf") => {
                Ok(f64::INFINITY)
            }
            Repr::Text(text) => Err(serde::de::Error::custom(format!(
                "invalid profit factor '{text}'"
            ))),
        }
    }
}
