//! EMA crossover with ATR-based exits.
//!
//! Long when the fast EMA crosses above the slow EMA, short on the opposite
//! cross. Stops sit `atr_stop` ATRs behind the close, targets `atr_target`
//! ATRs ahead. While in profit the stop trails by the same ATR distance, and
//! an opposite EMA relation requests an immediate close.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::registry::{param, param_usize, RegistryError};
use super::{ManagementOutput, SignalOutput, Strategy};
use crate::config::BacktestConfig;
use crate::domain::{Candle, Position, Side, Timeframe};
use crate::indicators::{Atr, Ema, Indicator};

/// Identifies a history slice: length, first and last open time, last close.
type HistoryKey = (usize, i64, i64, u64);

fn history_key(history: &[Candle]) -> HistoryKey {
    let first = history.first().map_or(i64::MIN, |c| c.open_time);
    let (last, close) = history
        .last()
        .map_or((i64::MIN, 0), |c| (c.open_time, c.close.to_bits()));
    (history.len(), first, last, close)
}

/// Indicator values at the last candle of one history slice.
#[derive(Debug, Clone, Copy)]
struct BarIndicators {
    key: HistoryKey,
    spreads: Option<(f64, f64)>,
    atr: Option<f64>,
}

#[derive(Debug)]
pub struct EmaCross {
    fast: Ema,
    slow: Ema,
    atr: Atr,
    fast_period: usize,
    slow_period: usize,
    atr_period: usize,
    atr_stop: f64,
    atr_target: f64,
    /// History only grows once per primary bar while `manage` runs on every
    /// management tick, so the last computation is reused until it changes.
    cache: Mutex<Option<BarIndicators>>,
}

impl EmaCross {
    pub const ID: u32 = 1;

    pub fn new(fast: usize, slow: usize, atr_period: usize, atr_stop: f64, atr_target: f64) -> Self {
        let fast_period = fast.max(1);
        let slow_period = slow.max(1);
        let atr_period = atr_period.max(1);
        Self {
            fast: Ema::new(fast_period),
            slow: Ema::new(slow_period),
            atr: Atr::new(atr_period),
            fast_period,
            slow_period,
            atr_period,
            atr_stop,
            atr_target,
            cache: Mutex::new(None),
        }
    }

    pub fn from_params(params: &BTreeMap<String, f64>) -> Result<Self, RegistryError> {
        Ok(Self::new(
            param_usize(params, "fast", 12)?,
            param_usize(params, "slow", 26)?,
            param_usize(params, "atr_period", 14)?,
            param(params, "atr_stop", 2.0),
            param(params, "atr_target", 3.0),
        ))
    }

    /// Fast minus slow at the last two candles.
    fn spreads(&self, history: &[Candle]) -> Option<(f64, f64)> {
        let fast = self.fast.compute(history);
        let slow = self.slow.compute(history);
        let n = history.len();
        if n < 2 {
            return None;
        }
        let prev = fast[n - 2] - slow[n - 2];
        let cur = fast[n - 1] - slow[n - 1];
        (prev.is_finite() && cur.is_finite()).then_some((prev, cur))
    }

    fn indicators(&self, history: &[Candle]) -> BarIndicators {
        let key = history_key(history);
        if let Some(hit) = self.cache.lock().ok().and_then(|cache| *cache).filter(|c| c.key == key) {
            return hit;
        }
        let computed = BarIndicators {
            key,
            spreads: self.spreads(history),
            atr: self.atr.latest(history),
        };
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(computed);
        }
        computed
    }
}

impl Strategy for EmaCross {
    fn id(&self) -> u32 {
        Self::ID
    }

    fn name(&self) -> &str {
        "ema_cross"
    }

    fn warmup_bars(&self) -> usize {
        self.fast_period.max(self.slow_period).max(self.atr_period).saturating_add(1)
    }

    fn generate(
        &self,
        history: &[Candle],
        _timeframe: Timeframe,
        _config: &BacktestConfig,
        _higher_timeframe: Option<&[Candle]>,
    ) -> SignalOutput {
        if history.len() < self.warmup_bars() {
            return SignalOutput::hold();
        }
        let bar = self.indicators(history);
        let (Some((prev, cur)), Some(atr), Some(last)) = (bar.spreads, bar.atr, history.last()) else {
            return SignalOutput::hold();
        };

        let side = if prev <= 0.0 && cur > 0.0 {
            Side::Long
        } else if prev >= 0.0 && cur < 0.0 {
            Side::Short
        } else {
            return SignalOutput::hold();
        };

        let direction = if side == Side::Long { "above" } else { "below" };
        let stop = last.close - side.sign() * atr * self.atr_stop;
        let target = last.close + side.sign() * atr * self.atr_target;
        SignalOutput::enter(
            side,
            format!("EMA{} crossed {direction} EMA{}", self.fast_period, self.slow_period),
        )
        .with_levels(Some(stop), Some(target))
        .with_entry_hint(last.close)
    }

    fn manage(
        &self,
        position: &Position,
        history: &[Candle],
        current_price: f64,
        _config: &BacktestConfig,
    ) -> ManagementOutput {
        if history.len() < self.warmup_bars() {
            return ManagementOutput::default();
        }
        let mut out = ManagementOutput::default();
        let bar = self.indicators(history);

        if let Some((_, cur)) = bar.spreads {
            if cur * position.side.sign() < 0.0 {
                out.close_position = true;
                out.reasons.push("EMA trend reversed".to_string());
                return out;
            }
        }

        if position.unrealized_pnl(current_price) > 0.0 {
            if let Some(atr) = bar.atr {
                out.new_stop_loss = Some(current_price - position.side.sign() * atr * self.atr_stop);
                out.reasons.push(format!("ATR trail {:.1}x", self.atr_stop));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StopReason;
    use crate::indicators::make_candles;
    use crate::strategy::Signal;

    /// 40 steadily trending candles followed by one shock close.
    fn trend_then(start: f64, step: f64, shock: f64) -> Vec<Candle> {
        let mut closes: Vec<f64> = (0..40).map(|i| start + step * i as f64).collect();
        closes.push(shock);
        make_candles(&closes)
    }

    fn long_at(entry: f64) -> Position {
        Position {
            side: Side::Long,
            entry_price: entry,
            entry_time: 0,
            initial_size: 1.0,
            size: 1.0,
            leverage: 1.0,
            invested: entry,
            stop_loss: entry * 0.9,
            take_profit: None,
            initial_stop_loss: entry * 0.9,
            initial_take_profit: None,
            stop_reason: StopReason::AgentLogic,
            tp_ladder: Vec::new(),
            realized_pnl: 0.0,
            fees_paid: 0.0,
            entry_reasons: Vec::new(),
        }
    }

    fn config() -> BacktestConfig {
        BacktestConfig::new(EmaCross::ID, 1_000.0)
    }

    #[test]
    fn cross_up_buys_with_atr_levels() {
        let strategy = EmaCross::from_params(&BTreeMap::new()).unwrap();
        let out = strategy.generate(&trend_then(140.0, -1.0, 250.0), Timeframe::H1, &config(), None);
        assert_eq!(out.signal, Signal::Buy);
        let (sl, tp) = (out.stop_loss.unwrap(), out.take_profit.unwrap());
        assert!(sl < 250.0 && tp > 250.0);
        assert_eq!(out.entry_price_hint, Some(250.0));
    }

    #[test]
    fn cross_down_sells() {
        let strategy = EmaCross::from_params(&BTreeMap::new()).unwrap();
        let out = strategy.generate(&trend_then(100.0, 1.0, 30.0), Timeframe::H1, &config(), None);
        assert_eq!(out.signal, Signal::Sell);
        assert!(out.stop_loss.unwrap() > 30.0);
        assert!(out.take_profit.unwrap() < 30.0);
    }

    #[test]
    fn steady_trend_holds() {
        let strategy = EmaCross::from_params(&BTreeMap::new()).unwrap();
        let out = strategy.generate(&trend_then(100.0, 1.0, 140.0), Timeframe::H1, &config(), None);
        assert_eq!(out.signal, Signal::Hold);
    }

    #[test]
    fn short_history_holds() {
        let strategy = EmaCross::from_params(&BTreeMap::new()).unwrap();
        let candles = make_candles(&[100.0, 105.0]);
        assert_eq!(
            strategy.generate(&candles, Timeframe::H1, &config(), None).signal,
            Signal::Hold
        );
    }

    #[test]
    fn trails_in_profit_and_closes_on_reversal() {
        let strategy = EmaCross::from_params(&BTreeMap::new()).unwrap();

        let rising: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let out = strategy.manage(&long_at(120.0), &make_candles(&rising), 160.0, &config());
        assert!(!out.close_position);
        let stop = out.new_stop_loss.unwrap();
        assert!(stop > 120.0 && stop < 160.0);

        let falling: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        let out = strategy.manage(&long_at(150.0), &make_candles(&falling), 141.0, &config());
        assert!(out.close_position);
    }

    #[test]
    fn ticks_within_a_bar_reuse_indicators() {
        let strategy = EmaCross::from_params(&BTreeMap::new()).unwrap();
        let rising = make_candles(&(0..60).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let fresh = EmaCross::from_params(&BTreeMap::new()).unwrap();

        let first = strategy.manage(&long_at(120.0), &rising, 160.0, &config());
        let cached = strategy.cache.lock().unwrap().map(|c| c.key);
        assert_eq!(cached, Some(history_key(&rising)));

        // A later tick of the same bar: same history, new price.
        let later = strategy.manage(&long_at(120.0), &rising, 165.0, &config());
        let expected = fresh.manage(&long_at(120.0), &rising, 165.0, &config());
        assert_eq!(later, expected);
        assert_ne!(first.new_stop_loss, later.new_stop_loss);

        // Appending a bar invalidates the cached values.
        let mut longer = rising.clone();
        longer.push(Candle::new(60 * 60_000, 159.0, 161.0, 158.0, 160.0, 1_000.0));
        strategy.manage(&long_at(120.0), &longer, 165.0, &config());
        let cached = strategy.cache.lock().unwrap().map(|c| c.key);
        assert_eq!(cached, Some(history_key(&longer)));
    }
}
