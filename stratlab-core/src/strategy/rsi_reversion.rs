//! RSI mean reversion with optional higher-timeframe confirmation.
//!
//! Long when RSI climbs back above `oversold`, short when it falls back below
//! `overbought`. When higher-timeframe candles are supplied, longs require the
//! higher-timeframe close at or above its EMA and shorts at or below it.

use std::collections::BTreeMap;

use super::registry::{param, param_usize, RegistryError};
use super::{SignalOutput, Strategy};
use crate::config::BacktestConfig;
use crate::domain::{Candle, Side, Timeframe};
use crate::indicators::{Ema, Indicator, Rsi};

#[derive(Debug, Clone)]
pub struct RsiReversion {
    rsi: Rsi,
    htf_ema: Ema,
    period: usize,
    oversold: f64,
    overbought: f64,
    stop_pct: f64,
    target_pct: f64,
}

impl RsiReversion {
    pub const ID: u32 = 3;

    pub fn from_params(params: &BTreeMap<String, f64>) -> Result<Self, RegistryError> {
        let period = param_usize(params, "period", 14)?.max(1);
        Ok(Self {
            rsi: Rsi::new(period),
            htf_ema: Ema::new(param_usize(params, "htf_ema", 20)?),
            period,
            oversold: param(params, "oversold", 30.0),
            overbought: param(params, "overbought", 70.0),
            stop_pct: param(params, "stop_pct", 2.0),
            target_pct: param(params, "target_pct", 4.0),
        })
    }

    /// Whether the higher timeframe agrees with `side`. `None` when no
    /// higher-timeframe candles were supplied.
    fn confirms(&self, higher: Option<&[Candle]>, side: Side) -> Option<bool> {
        let higher = higher?;
        let ema = self.htf_ema.latest(higher);
        let close = higher.last().map(|c| c.close);
        Some(match (ema, close) {
            (Some(ema), Some(close)) => match side {
                Side::Long => close >= ema,
                Side::Short => close <= ema,
            },
            _ => false,
        })
    }
}

impl Strategy for RsiReversion {
    fn id(&self) -> u32 {
        Self::ID
    }

    fn name(&self) -> &str {
        "rsi_reversion"
    }

    fn warmup_bars(&self) -> usize {
        self.period.saturating_add(2)
    }

    fn generate(
        &self,
        history: &[Candle],
        _timeframe: Timeframe,
        _config: &BacktestConfig,
        higher_timeframe: Option<&[Candle]>,
    ) -> SignalOutput {
        let n = history.len();
        if n < self.warmup_bars() {
            return SignalOutput::hold();
        }
        let rsi = self.rsi.compute(history);
        let (prev, cur) = (rsi[n - 2], rsi[n - 1]);
        if !(prev.is_finite() && cur.is_finite()) {
            return SignalOutput::hold();
        }

        let side = if prev < self.oversold && cur >= self.oversold {
            Side::Long
        } else if prev > self.overbought && cur <= self.overbought {
            Side::Short
        } else {
            return SignalOutput::hold();
        };

        let mut reasons = vec![format!("RSI{} reverted to {cur:.1}", self.period)];
        match self.confirms(higher_timeframe, side) {
            Some(false) => return SignalOutput::hold(),
            Some(true) => reasons.push("higher timeframe confirms".to_string()),
            None => {}
        }

        let close = history[n - 1].close;
        let mut out = SignalOutput::enter(side, reasons.remove(0)).with_levels(
            Some(side.offset_adverse(close, self.stop_pct)),
            Some(side.offset_favorable(close, self.target_pct)),
        );
        out.reasons.extend(reasons);
        out
    }
}
