//! Donchian channel breakout.
//!
//! Long when the close breaks above the prior `lookback`-bar high, short when
//! it breaks below the prior low. The stop sits at the opposite band and the
//! target at `reward_multiple` times that risk.

use std::collections::BTreeMap;

use super::registry::{param, param_usize, RegistryError};
use super::{SignalOutput, Strategy};
use crate::config::BacktestConfig;
use crate::domain::{Candle, Side, Timeframe};
use crate::indicators::{Donchian, Indicator};

#[derive(Debug, Clone)]
pub struct DonchianBreakout {
    upper: Donchian,
    lower: Donchian,
    lookback: usize,
    reward_multiple: f64,
}

impl DonchianBreakout {
    pub const ID: u32 = 2;

    pub fn new(lookback: usize, reward_multiple: f64) -> Self {
        let lookback = lookback.max(1);
        Self {
            upper: Donchian::upper(lookback),
            lower: Donchian::lower(lookback),
            lookback,
            reward_multiple,
        }
    }

    pub fn from_params(params: &BTreeMap<String, f64>) -> Result<Self, RegistryError> {
        Ok(Self::new(
            param_usize(params, "lookback", 20)?,
            param(params, "reward_multiple", 2.0),
        ))
    }
}

impl Strategy for DonchianBreakout {
    fn id(&self) -> u32 {
        Self::ID
    }

    fn name(&self) -> &str {
        "donchian_breakout"
    }

    fn warmup_bars(&self) -> usize {
        self.lookback.saturating_add(1)
    }

    fn generate(
        &self,
        history: &[Candle],
        _timeframe: Timeframe,
        _config: &BacktestConfig,
        _higher_timeframe: Option<&[Candle]>,
    ) -> SignalOutput {
        let Some((last, prior)) = history.split_last() else {
            return SignalOutput::hold();
        };
        if history.len() < self.warmup_bars() {
            return SignalOutput::hold();
        }
        let (Some(upper), Some(lower)) = (self.upper.latest(prior), self.lower.latest(prior)) else {
            return SignalOutput::hold();
        };

        let (side, stop, band) = if last.close > upper {
            (Side::Long, lower, upper)
        } else if last.close < lower {
            (Side::Short, upper, lower)
        } else {
            return SignalOutput::hold();
        };

        let risk = (last.close - stop).abs();
        let target = last.close + side.sign() * risk * self.reward_multiple;
        SignalOutput::enter(
            side,
            format!("close {:.2} broke {}-bar band {band:.2}", last.close, self.lookback),
        )
        .with_levels(Some(stop), Some(target))
        .with_entry_hint(last.close)
    }
}
