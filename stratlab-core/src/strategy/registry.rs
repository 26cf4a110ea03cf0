//! Strategy lookup table keyed by numeric id.

use std::collections::BTreeMap;

use super::{DonchianBreakout, EmaCross, RsiReversion, Strategy};

/// Upper bound for integer (period-like) parameters.
pub const MAX_PERIOD: usize = 100_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown strategy id: {0}")]
    UnknownStrategy(u32),
    #[error("parameter {name} = {value} must be a whole number in 0..={max}")]
    InvalidParam { name: String, value: f64, max: usize },
}

/// Builds a strategy from named parameters.
pub type StrategyBuilder = fn(&BTreeMap<String, f64>) -> Result<Box<dyn Strategy>, RegistryError>;

fn boxed<S: Strategy + 'static>(
    strategy: Result<S, RegistryError>,
) -> Result<Box<dyn Strategy>, RegistryError> {
    strategy.map(|s| Box::new(s) as Box<dyn Strategy>)
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyInfo {
    pub id: u32,
    pub name: &'static str,
    /// Parameter names the strategy reads, for sweep axes and help text.
    pub params: &'static [&'static str],
}

pub struct StrategyRegistry {
    entries: BTreeMap<u32, (StrategyInfo, StrategyBuilder)>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry with the reference strategies.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(
            StrategyInfo {
                id: EmaCross::ID,
                name: "ema_cross",
                params: &["fast", "slow", "atr_period", "atr_stop", "atr_target"],
            },
            |p| boxed(EmaCross::from_params(p)),
        );
        registry.register(
            StrategyInfo {
                id: DonchianBreakout::ID,
                name: "donchian_breakout",
                params: &["lookback", "reward_multiple"],
            },
            |p| boxed(DonchianBreakout::from_params(p)),
        );
        registry.register(
            StrategyInfo {
                id: RsiReversion::ID,
                name: "rsi_reversion",
                params: &["period", "oversold", "overbought", "stop_pct", "target_pct", "htf_ema"],
            },
            |p| boxed(RsiReversion::from_params(p)),
        );
        registry
    }

    /// Add or replace a strategy.
    pub fn register(&mut self, info: StrategyInfo, builder: StrategyBuilder) {
        self.entries.insert(info.id, (info, builder));
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn info(&self, id: u32) -> Result<StrategyInfo, RegistryError> {
        self.entries
            .get(&id)
            .map(|(info, _)| *info)
            .ok_or(RegistryError::UnknownStrategy(id))
    }

    /// Registered strategies in id order.
    pub fn list(&self) -> impl Iterator<Item = StrategyInfo> + '_ {
        self.entries.values().map(|(info, _)| *info)
    }

    pub fn build(
        &self,
        id: u32,
        params: &BTreeMap<String, f64>,
    ) -> Result<Box<dyn Strategy>, RegistryError> {
        let (_, builder) = self
            .entries
            .get(&id)
            .ok_or(RegistryError::UnknownStrategy(id))?;
        builder(params)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Named parameter with a fallback.
pub(crate) fn param(params: &BTreeMap<String, f64>, name: &str, default: f64) -> f64 {
    params.get(name).copied().unwrap_or(default)
}

/// Named integer parameter with a fallback. Present values are rounded and
/// must lie in `0..=MAX_PERIOD`.
pub(crate) fn param_usize(
    params: &BTreeMap<String, f64>,
    name: &str,
    default: usize,
) -> Result<usize, RegistryError> {
    let Some(&value) = params.get(name) else {
        return Ok(default);
    };
    let rounded = value.round();
    if !rounded.is_finite() || rounded < 0.0 || rounded > MAX_PERIOD as f64 {
        return Err(RegistryError::InvalidParam {
            name: name.to_string(),
            value,
            max: MAX_PERIOD,
        });
    }
    Ok(rounded as usize)
}
