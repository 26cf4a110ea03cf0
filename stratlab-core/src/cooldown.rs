//! Post-profit cooldown and exhaustion veto.
//!
//! After a profitable close the next same-direction entry must pass an
//! exhaustion check. The mode is single-shot: whatever the next evaluated
//! signal is, the mode ends there.

use serde::{Deserialize, Serialize};

use crate::config::ExhaustionConfig;
use crate::domain::{Candle, Side};
use crate::indicators::{Indicator, Rsi};
use crate::strategy::Signal;

/// External indicator check consulted before re-entering after a win.
pub trait ExhaustionCheck: Send + Sync {
    /// True if a new `side` entry should be vetoed at the end of `history`.
    fn is_exhausted(&self, history: &[Candle], side: Side) -> bool;
}

/// Long exhausted when RSI ≥ overbought, short when RSI ≤ oversold.
#[derive(Debug, Clone)]
pub struct RsiExhaustion {
    rsi: Rsi,
    overbought: f64,
    oversold: f64,
}

impl RsiExhaustion {
    pub fn new(config: &ExhaustionConfig) -> Self {
        Self {
            rsi: Rsi::new(config.rsi_period),
            overbought: config.overbought,
            oversold: config.oversold,
        }
    }
}

impl ExhaustionCheck for RsiExhaustion {
    fn is_exhausted(&self, history: &[Candle], side: Side) -> bool {
        let Some(rsi) = self.rsi.latest(history) else {
            return false;
        };
        match side {
            Side::Long => rsi >= self.overbought,
            Side::Short => rsi <= self.oversold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CooldownState {
    #[default]
    Idle,
    PostProfit {
        side: Side,
    },
}

/// Result of passing a signal through the cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownVerdict {
    Pass,
    Vetoed,
}

#[derive(Debug, Clone, Default)]
pub struct Cooldown {
    enabled: bool,
    state: CooldownState,
}

impl Cooldown {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: CooldownState::Idle,
        }
    }

    pub fn state(&self) -> CooldownState {
        self.state
    }

    /// Record a closed trade. Only a net-profitable close arms the cooldown.
    pub fn on_close(&mut self, side: Side, pnl: f64) {
        self.state = if self.enabled && pnl > 0.0 {
            CooldownState::PostProfit { side }
        } else {
            CooldownState::Idle
        };
    }

    /// Filter the next evaluated signal. Any signal ends the post-profit mode;
    /// only a same-direction one runs `check`.
    pub fn filter(
        &mut self,
        signal: Signal,
        history: &[Candle],
        check: &dyn ExhaustionCheck,
    ) -> CooldownVerdict {
        let CooldownState::PostProfit { side } = std::mem::take(&mut self.state) else {
            return CooldownVerdict::Pass;
        };
        match signal.side() {
            Some(candidate) if candidate == side && check.is_exhausted(history, side) => {
                CooldownVerdict::Vetoed
            }
            _ => CooldownVerdict::Pass,
        }
    }
}
