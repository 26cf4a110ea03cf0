//! Position: the single live exposure owned by the lifecycle engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::candle::Candle;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short. Multiplies a price move into PnL.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// True if `candidate` is a strictly tighter stop than `current` for this side.
    pub fn is_tighter_stop(&self, candidate: f64, current: f64) -> bool {
        match self {
            Side::Long => candidate > current,
            Side::Short => candidate < current,
        }
    }

    /// Price `pct` percent away from `price` in this side's favorable direction.
    pub fn offset_favorable(&self, price: f64, pct: f64) -> f64 {
        price * (1.0 + self.sign() * pct / 100.0)
    }

    /// Price `pct` percent away from `price` in this side's adverse direction.
    pub fn offset_adverse(&self, price: f64, pct: f64) -> f64 {
        price * (1.0 - self.sign() * pct / 100.0)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("LONG"),
            Side::Short => f.write_str("SHORT"),
        }
    }
}

/// Which layer set the currently active stop-loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    AgentLogic,
    HardCap,
    UniversalTrail,
    AgentTrail,
}

/// One rung of a partial take-profit ladder. Each rung fires at most once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpRung {
    pub price: f64,
    /// Fraction of the *initial* size closed when this rung fires.
    pub fraction: f64,
    pub hit: bool,
}

/// An open position.
///
/// Exactly one component mutates a `Position`: the lifecycle engine that
/// opened it. When it closes, a `Trade` snapshot is taken and the value is
/// dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: i64,
    pub initial_size: f64,
    /// Remaining size after partial take-profits.
    pub size: f64,
    pub leverage: f64,
    /// Capital committed to the position (margin).
    pub invested: f64,

    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub initial_stop_loss: f64,
    pub initial_take_profit: Option<f64>,
    pub stop_reason: StopReason,

    pub tp_ladder: Vec<TpRung>,

    /// Net PnL already realized: entry fee plus closed partials (gross minus fees).
    pub realized_pnl: f64,
    pub fees_paid: f64,
    pub entry_reasons: Vec<String>,
}

impl Position {
    /// Unrealized PnL of the remaining size at `price`, before exit fees.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.gross_pnl(price, self.size)
    }

    /// Directional gross PnL for closing `quantity` at `price`.
    pub fn gross_pnl(&self, price: f64, quantity: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * quantity
    }

    pub fn stop_touched(&self, candle: &Candle) -> bool {
        match self.side {
            Side::Long => candle.low <= self.stop_loss,
            Side::Short => candle.high >= self.stop_loss,
        }
    }

    pub fn take_profit_touched(&self, candle: &Candle) -> bool {
        match (self.side, self.take_profit) {
            (Side::Long, Some(tp)) => candle.high >= tp,
            (Side::Short, Some(tp)) => candle.low <= tp,
            (_, None) => false,
        }
    }

    /// Move the stop to `candidate` if it is strictly tighter than the current
    /// one. Returns whether the stop moved. Stops never loosen.
    pub fn tighten_stop(&mut self, candidate: f64, reason: StopReason) -> bool {
        if !candidate.is_finite() || !self.side.is_tighter_stop(candidate, self.stop_loss) {
            return false;
        }
        self.stop_loss = candidate;
        self.stop_reason = reason;
        true
    }

    /// Favorable move from entry to `price`, in percent.
    pub fn favorable_move_pct(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) / self.entry_price * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_position() -> Position {
        Position {
            side: Side::Long,
            entry_price: 100.0,
            entry_time: 0,
            initial_size: 10.0,
            size: 10.0,
            leverage: 1.0,
            invested: 1_000.0,
            stop_loss: 95.0,
            take_profit: Some(110.0),
            initial_stop_loss: 95.0,
            initial_take_profit: Some(110.0),
            stop_reason: StopReason::AgentLogic,
            tp_ladder: Vec::new(),
            realized_pnl: 0.0,
            fees_paid: 0.0,
            entry_reasons: Vec::new(),
        }
    }

    #[test]
    fn unrealized_pnl_follows_side() {
        let mut pos = long_position();
        assert_eq!(pos.unrealized_pnl(105.0), 50.0);
        pos.side = Side::Short;
        assert_eq!(pos.unrealized_pnl(105.0), -50.0);
    }

    #[test]
    fn stop_only_tightens_for_long() {
        let mut pos = long_position();
        assert!(pos.tighten_stop(97.0, StopReason::UniversalTrail));
        assert_eq!(pos.stop_reason, StopReason::UniversalTrail);
        assert!(!pos.tighten_stop(96.0, StopReason::AgentTrail));
        assert!(!pos.tighten_stop(97.0, StopReason::AgentTrail));
        assert_eq!(pos.stop_loss, 97.0);
        assert_eq!(pos.stop_reason, StopReason::UniversalTrail);
    }

    #[test]
    fn stop_only_tightens_for_short() {
        let mut pos = long_position();
        pos.side = Side::Short;
        pos.stop_loss = 105.0;
        assert!(pos.tighten_stop(103.0, StopReason::AgentTrail));
        assert!(!pos.tighten_stop(104.0, StopReason::AgentTrail));
        assert_eq!(pos.stop_loss, 103.0);
    }

    #[test]
    fn touches_use_correct_extremes() {
        let pos = long_position();
        let candle = Candle::new(0, 100.0, 111.0, 98.0, 104.0, 1.0);
        assert!(!pos.stop_touched(&candle));
        assert!(pos.take_profit_touched(&candle));
    }

    #[test]
    fn side_offsets() {
        assert!((Side::Long.offset_adverse(100.0, 5.0) - 95.0).abs() < 1e-9);
        assert!((Side::Short.offset_adverse(100.0, 5.0) - 105.0).abs() < 1e-9);
        assert!((Side::Short.offset_favorable(100.0, 10.0) - 90.0).abs() < 1e-9);
    }
}
