//! Signal generation: the pluggable strategy contract.
//!
//! Strategies are pure with respect to their inputs: the same history and
//! configuration always produce the same output. They never see engine
//! state other than the open position handed to `manage`.

use serde::{Deserialize, Serialize};

use crate::config::BacktestConfig;
use crate::domain::{Candle, Position, Side, Timeframe};

pub mod donchian_breakout;
pub mod ema_cross;
pub mod registry;
pub mod rsi_reversion;

pub use donchian_breakout::DonchianBreakout;
pub use ema_cross::EmaCross;
pub use registry::{RegistryError, StrategyRegistry};
pub use rsi_reversion::RsiReversion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Direction of the entry this signal asks for; `None` for HOLD.
    pub fn side(&self) -> Option<Side> {
        match self {
            Signal::Buy => Some(Side::Long),
            Signal::Sell => Some(Side::Short),
            Signal::Hold => None,
        }
    }
}

/// Output of [`Strategy::generate`].
///
/// Stop-loss and take-profit are absolute prices computed from the signal
/// bar; the risk cap layer re-validates them against the actual fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutput {
    pub signal: Signal,
    pub reasons: Vec<String>,
    pub entry_price_hint: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl SignalOutput {
    pub fn hold() -> Self {
        Self {
            signal: Signal::Hold,
            reasons: Vec::new(),
            entry_price_hint: None,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn enter(side: Side, reason: impl Into<String>) -> Self {
        Self {
            signal: match side {
                Side::Long => Signal::Buy,
                Side::Short => Signal::Sell,
            },
            reasons: vec![reason.into()],
            ..Self::hold()
        }
    }

    pub fn with_levels(mut self, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    pub fn with_entry_hint(mut self, price: f64) -> Self {
        self.entry_price_hint = Some(price);
        self
    }
}

/// Output of [`Strategy::manage`]. The default leaves the position alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagementOutput {
    pub new_stop_loss: Option<f64>,
    pub new_take_profit: Option<f64>,
    pub close_position: bool,
    pub reasons: Vec<String>,
}

/// A signal generator keyed by numeric id.
pub trait Strategy: Send + Sync {
    fn id(&self) -> u32;

    /// Human-readable name (e.g., "ema_cross").
    fn name(&self) -> &str;

    /// Candles needed before `generate` can produce anything but HOLD.
    fn warmup_bars(&self) -> usize;

    /// Evaluate the last closed candle of `history`.
    ///
    /// `higher_timeframe` holds completed higher-timeframe candles when the
    /// configuration asks for confirmation.
    fn generate(
        &self,
        history: &[Candle],
        timeframe: Timeframe,
        config: &BacktestConfig,
        higher_timeframe: Option<&[Candle]>,
    ) -> SignalOutput;

    /// Adjust an open position at `current_price`.
    fn manage(
        &self,
        _position: &Position,
        _history: &[Candle],
        _current_price: f64,
        _config: &BacktestConfig,
    ) -> ManagementOutput {
        ManagementOutput::default()
    }
}
