//! Serializable run configuration.
//!
//! A `BacktestConfig` captures everything needed to reproduce a run: strategy
//! identity and parameters, market settings, sizing, stop-loss/take-profit
//! policy, risk cap, cooldown and fee model. It is immutable for the duration
//! of a run and owned by the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Side, Timeframe};

/// Content-addressed identifier for a configuration.
pub type RunId = String;

/// Spot or derivatives market. Leverage only applies to futures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Spot,
    #[default]
    Futures,
}

/// Which directions a run may trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    LongOnly,
    ShortOnly,
    #[default]
    LongShort,
}

impl TradingMode {
    pub fn allows(&self, side: Side) -> bool {
        matches!(
            (self, side),
            (TradingMode::LongShort, _)
                | (TradingMode::LongOnly, Side::Long)
                | (TradingMode::ShortOnly, Side::Short)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginType {
    #[default]
    Isolated,
    Cross,
}

/// Where orders go. `Live` routes entries and exits through an
/// [`OrderGateway`](crate::engine::OrderGateway).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Simulated,
    Live,
}

/// How a stop-loss or take-profit value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelMode {
    /// Percent distance from entry price.
    Percent,
    /// Absolute price.
    Price,
}

/// User stop-loss or take-profit setting.
///
/// When `locked`, the user value overrides whatever the strategy proposes.
/// When unlocked it is only a fallback for strategies that propose nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    pub mode: LevelMode,
    pub value: f64,
    #[serde(default)]
    pub locked: bool,
}

impl LevelConfig {
    /// Stop-loss price for an entry at `entry` on `side`.
    pub fn stop_price(&self, entry: f64, side: Side) -> f64 {
        match self.mode {
            LevelMode::Percent => side.offset_adverse(entry, self.value),
            LevelMode::Price => self.value,
        }
    }

    /// Take-profit price for an entry at `entry` on `side`.
    pub fn target_price(&self, entry: f64, side: Side) -> f64 {
        match self.mode {
            LevelMode::Percent => side.offset_favorable(entry, self.value),
            LevelMode::Price => self.value,
        }
    }
}

/// Universal trailing stop, applied regardless of strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// Favorable move from entry (percent) before trailing starts.
    pub activation_pct: f64,
    /// Distance of the trailing stop behind the current price (percent).
    pub distance_pct: f64,
}

/// One partial take-profit rung, relative to entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialTpConfig {
    pub distance_pct: f64,
    /// Fraction of the initial size closed at this rung.
    pub fraction: f64,
}

/// Parameters of the default RSI exhaustion check used by the cooldown veto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExhaustionConfig {
    pub rsi_period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for ExhaustionConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            overbought: 70.0,
            oversold: 30.0,
        }
    }
}

/// Complete configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    // ── Strategy ──
    pub strategy_id: u32,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,

    // ── Market ──
    #[serde(default = "default_pair")]
    pub pair: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    #[serde(default)]
    pub market: MarketType,
    #[serde(default)]
    pub trading_mode: TradingMode,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub margin_type: MarginType,

    // ── Sizing ──
    pub investment: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_quantity_precision")]
    pub quantity_precision: u32,
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,

    // ── Exits ──
    #[serde(default)]
    pub stop_loss: Option<LevelConfig>,
    #[serde(default)]
    pub take_profit: Option<LevelConfig>,
    #[serde(default = "default_hard_cap_pct")]
    pub hard_cap_pct: f64,
    #[serde(default)]
    pub trailing: Option<TrailingConfig>,
    #[serde(default)]
    pub partial_take_profits: Vec<PartialTpConfig>,

    // ── Entry gating ──
    #[serde(default)]
    pub cooldown_enabled: bool,
    #[serde(default)]
    pub exhaustion: ExhaustionConfig,
    #[serde(default)]
    pub higher_timeframe: Option<Timeframe>,
    #[serde(default = "default_min_history_bars")]
    pub min_history_bars: usize,
}

fn default_pair() -> String {
    "BTCUSDT".to_string()
}

fn default_timeframe() -> Timeframe {
    Timeframe::H1
}

fn default_leverage() -> f64 {
    1.0
}

fn default_quantity_precision() -> u32 {
    3
}

fn default_step_size() -> f64 {
    0.001
}

fn default_fee_rate() -> f64 {
    0.0004
}

fn default_hard_cap_pct() -> f64 {
    10.0
}

fn default_min_history_bars() -> usize {
    200
}

/// Genuine misconfiguration, reported before any simulation runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("investment must be positive, got {0}")]
    Investment(f64),
    #[error("leverage must be >= 1, got {0}")]
    Leverage(f64),
    #[error("fee rate must be in [0, 1), got {0}")]
    FeeRate(f64),
    #[error("step size must be positive, got {0}")]
    StepSize(f64),
    #[error("hard cap percent must be in (0, 100], got {0}")]
    HardCap(f64),
    #[error("{field} value must be positive, got {value}")]
    Level { field: &'static str, value: f64 },
    #[error("trailing {field} must be positive, got {value}")]
    Trailing { field: &'static str, value: f64 },
    #[error("partial take-profit rung {index}: {reason}")]
    PartialTp { index: usize, reason: String },
    #[error("spot market cannot trade short-only")]
    SpotShortOnly,
    #[error("higher timeframe {higher} must be coarser than primary {primary}")]
    HigherTimeframe {
        higher: Timeframe,
        primary: Timeframe,
    },
}

impl BacktestConfig {
    /// Minimal configuration with defaults for everything but strategy and investment.
    pub fn new(strategy_id: u32, investment: f64) -> Self {
        Self {
            strategy_id,
            params: BTreeMap::new(),
            pair: default_pair(),
            timeframe: default_timeframe(),
            market: MarketType::default(),
            trading_mode: TradingMode::default(),
            execution_mode: ExecutionMode::default(),
            margin_type: MarginType::default(),
            investment,
            leverage: default_leverage(),
            quantity_precision: default_quantity_precision(),
            step_size: default_step_size(),
            fee_rate: default_fee_rate(),
            stop_loss: None,
            take_profit: None,
            hard_cap_pct: default_hard_cap_pct(),
            trailing: None,
            partial_take_profits: Vec::new(),
            cooldown_enabled: false,
            exhaustion: ExhaustionConfig::default(),
            higher_timeframe: None,
            min_history_bars: default_min_history_bars(),
        }
    }

    /// Leverage actually applied: 1 on spot markets.
    pub fn effective_leverage(&self) -> f64 {
        match self.market {
            MarketType::Spot => 1.0,
            MarketType::Futures => self.leverage,
        }
    }

    /// Whether the run may open a position on `side`.
    pub fn allows(&self, side: Side) -> bool {
        if self.market == MarketType::Spot && side == Side::Short {
            return false;
        }
        self.trading_mode.allows(side)
    }

    /// Copy of this config with parameters overridden by `overrides`.
    pub fn with_params<'a>(&self, overrides: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let mut derived = self.clone();
        for (name, value) in overrides {
            derived.params.insert(name.to_string(), value);
        }
        derived
    }

    /// Deterministic hash of the canonical JSON form.
    ///
    /// Two runs with identical configs share a `RunId`.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.investment > 0.0 && self.investment.is_finite()) {
            return Err(ConfigError::Investment(self.investment));
        }
        if !(self.leverage >= 1.0 && self.leverage.is_finite()) {
            return Err(ConfigError::Leverage(self.leverage));
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(ConfigError::FeeRate(self.fee_rate));
        }
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return Err(ConfigError::StepSize(self.step_size));
        }
        if !(self.hard_cap_pct > 0.0 && self.hard_cap_pct <= 100.0) {
            return Err(ConfigError::HardCap(self.hard_cap_pct));
        }
        for (field, level) in [("stop_loss", &self.stop_loss), ("take_profit", &self.take_profit)] {
            if let Some(level) = level {
                if !(level.value > 0.0 && level.value.is_finite()) {
                    return Err(ConfigError::Level {
                        field,
                        value: level.value,
                    });
                }
            }
        }
        if let Some(trailing) = &self.trailing {
            if !(trailing.activation_pct >= 0.0 && trailing.activation_pct.is_finite()) {
                return Err(ConfigError::Trailing {
                    field: "activation_pct",
                    value: trailing.activation_pct,
                });
            }
            if !(trailing.distance_pct > 0.0 && trailing.distance_pct < 100.0) {
                return Err(ConfigError::Trailing {
                    field: "distance_pct",
                    value: trailing.distance_pct,
                });
            }
        }
        let mut fraction_sum = 0.0;
        for (index, rung) in self.partial_take_profits.iter().enumerate() {
            if !(rung.fraction > 0.0 && rung.fraction < 1.0) {
                return Err(ConfigError::PartialTp {
                    index,
                    reason: format!("fraction must be in (0, 1), got {}", rung.fraction),
                });
            }
            if !(rung.distance_pct > 0.0 && rung.distance_pct.is_finite()) {
                return Err(ConfigError::PartialTp {
                    index,
                    reason: format!("distance must be positive, got {}", rung.distance_pct),
                });
            }
            fraction_sum += rung.fraction;
        }
        if fraction_sum >= 1.0 {
            return Err(ConfigError::PartialTp {
                index: self.partial_take_profits.len().saturating_sub(1),
                reason: format!("fractions sum to {fraction_sum}, must stay below 1"),
            });
        }
        if self.market == MarketType::Spot && self.trading_mode == TradingMode::ShortOnly {
            return Err(ConfigError::SpotShortOnly);
        }
        if let Some(higher) = self.higher_timeframe {
            if higher.duration_ms() <= self.timeframe.duration_ms() {
                return Err(ConfigError::HigherTimeframe {
                    higher,
                    primary: self.timeframe,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_deterministic_and_param_sensitive() {
        let config = BacktestConfig::new(1, 1_000.0);
        assert_eq!(config.run_id(), config.run_id());

        let changed = config.with_params([("fast", 12.0)]);
        assert_ne!(config.run_id(), changed.run_id());
        assert_eq!(changed.params.get("fast"), Some(&12.0));
    }

    #[test]
    fn spot_disables_leverage_and_shorts() {
        let mut config = BacktestConfig::new(1, 1_000.0);
        config.leverage = 10.0;
        assert_eq!(config.effective_leverage(), 10.0);
        assert!(config.allows(Side::Short));

        config.market = MarketType::Spot;
        assert_eq!(config.effective_leverage(), 1.0);
        assert!(!config.allows(Side::Short));
        assert!(config.allows(Side::Long));
    }

    #[test]
    fn trading_mode_filters_sides() {
        assert!(TradingMode::LongOnly.allows(Side::Long));
        assert!(!TradingMode::LongOnly.allows(Side::Short));
        assert!(TradingMode::ShortOnly.allows(Side::Short));
        assert!(TradingMode::LongShort.allows(Side::Short));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = BacktestConfig::new(1, 0.0);
        assert_eq!(config.validate(), Err(ConfigError::Investment(0.0)));

        config.investment = 1_000.0;
        config.hard_cap_pct = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::HardCap(_))));

        config.hard_cap_pct = 10.0;
        config.partial_take_profits = vec![
            PartialTpConfig { distance_pct: 1.0, fraction: 0.6 },
            PartialTpConfig { distance_pct: 2.0, fraction: 0.4 },
        ];
        assert!(matches!(config.validate(), Err(ConfigError::PartialTp { .. })));

        config.partial_take_profits.pop();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn higher_timeframe_must_be_coarser() {
        let mut config = BacktestConfig::new(1, 1_000.0);
        config.timeframe = Timeframe::H1;
        config.higher_timeframe = Some(Timeframe::M15);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HigherTimeframe { .. })
        ));
        config.higher_timeframe = Some(Timeframe::H4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn level_prices() {
        let sl = LevelConfig { mode: LevelMode::Percent, value: 5.0, locked: true };
        assert!((sl.stop_price(100.0, Side::Long) - 95.0).abs() < 1e-9);
        assert!((sl.stop_price(100.0, Side::Short) - 105.0).abs() < 1e-9);
        let tp = LevelConfig { mode: LevelMode::Price, value: 120.0, locked: false };
        assert_eq!(tp.target_price(100.0, Side::Long), 120.0);
    }

    #[test]
    fn config_serialization_roundtrip() {
        let mut config = BacktestConfig::new(2, 500.0);
        config.trailing = Some(TrailingConfig { activation_pct: 1.0, distance_pct: 0.5 });
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deser: BacktestConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deser);
    }
}
