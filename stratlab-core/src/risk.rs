//! Risk cap layer.
//!
//! Arbitrates between a strategy-proposed stop-loss, a user-locked stop-loss
//! and a hard maximum-loss ceiling expressed as a percentage of the invested
//! amount. Pure: the same inputs always give the same decision, in backtests
//! and in live management alike.

use serde::{Deserialize, Serialize};

use crate::config::BacktestConfig;
use crate::domain::{Side, StopReason};

/// Stop-loss / take-profit pair proposed for an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Final levels for a new position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    pub stop_loss: f64,
    pub take_profit: Option<f64>,
    pub reason: StopReason,
}

/// Stop price at which the loss equals `hard_cap_pct` percent of the margin.
///
/// With leverage L a price move of p% costs L·p% of the margin, so the
/// price distance is `hard_cap_pct / L`.
pub fn hard_cap_stop(entry: f64, side: Side, hard_cap_pct: f64, leverage: f64) -> f64 {
    side.offset_adverse(entry, hard_cap_pct / leverage.max(1.0))
}

fn valid_stop(entry: f64, side: Side, stop: f64) -> bool {
    stop.is_finite() && stop > 0.0 && side.is_tighter_stop(entry, stop)
}

fn valid_target(entry: f64, side: Side, target: f64) -> bool {
    target.is_finite() && target > 0.0 && side.is_tighter_stop(target, entry)
}

/// Decide the stop-loss and take-profit for an entry at `entry` on `side`.
///
/// Primary stop: the user value when locked, otherwise the strategy's
/// proposal, otherwise the unlocked user value. Levels on the wrong side of
/// the entry are ignored. The final stop is the tighter of the primary stop
/// and the hard cap; when the hard cap wins and the take-profit is not
/// locked, the take-profit is moved to keep the risk:reward ratio of the
/// strategy's proposal (or of the primary stop when the strategy gave none).
pub fn apply_risk_cap(
    entry: f64,
    side: Side,
    proposal: Proposal,
    config: &BacktestConfig,
) -> RiskDecision {
    let hard_cap = hard_cap_stop(entry, side, config.hard_cap_pct, config.effective_leverage());

    let user_stop = config
        .stop_loss
        .map(|level| (level.stop_price(entry, side), level.locked));
    let primary_stop = match user_stop {
        Some((stop, true)) => Some(stop),
        _ => proposal
            .stop_loss
            .filter(|&s| valid_stop(entry, side, s))
            .or(user_stop.map(|(stop, _)| stop)),
    }
    .filter(|&s| valid_stop(entry, side, s));

    let tp_locked = config.take_profit.is_some_and(|level| level.locked);
    let user_target = config.take_profit.map(|level| level.target_price(entry, side));
    let target = if tp_locked {
        user_target
    } else {
        proposal
            .take_profit
            .filter(|&t| valid_target(entry, side, t))
            .or(user_target)
    }
    .filter(|&t| valid_target(entry, side, t));

    let Some(primary) = primary_stop else {
        return RiskDecision {
            stop_loss: hard_cap,
            take_profit: target,
            reason: StopReason::HardCap,
        };
    };

    if !side.is_tighter_stop(hard_cap, primary) {
        return RiskDecision {
            stop_loss: primary,
            take_profit: target,
            reason: StopReason::AgentLogic,
        };
    }

    // Risk:reward is measured against the strategy's own stop when it gave
    // one, even if a locked user stop replaced it.
    let reference_stop = proposal
        .stop_loss
        .filter(|&s| valid_stop(entry, side, s))
        .unwrap_or(primary);
    let take_profit = match target {
        Some(tp) if !tp_locked => {
            let risk_reward = (tp - entry).abs() / (entry - reference_stop).abs();
            Some(entry + side.sign() * risk_reward * (entry - hard_cap).abs())
        }
        other => other,
    };

    RiskDecision {
        stop_loss: hard_cap,
        take_profit,
        reason: StopReason::HardCap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LevelConfig, LevelMode};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn config() -> BacktestConfig {
        BacktestConfig::new(1, 1_000.0)
    }

    #[test]
    fn strategy_stop_inside_cap_is_kept() {
        let decision = apply_risk_cap(
            100.0,
            Side::Long,
            Proposal { stop_loss: Some(95.0), take_profit: Some(110.0) },
            &config(),
        );
        assert_eq!(decision.stop_loss, 95.0);
        assert_eq!(decision.take_profit, Some(110.0));
        assert_eq!(decision.reason, StopReason::AgentLogic);
    }

    #[test]
    fn hard_cap_overrides_wide_stop() {
        // 50% loss proposed, 10% cap.
        let decision = apply_risk_cap(
            100.0,
            Side::Long,
            Proposal { stop_loss: Some(50.0), take_profit: Some(200.0) },
            &config(),
        );
        assert!(approx(decision.stop_loss, 90.0));
        assert_eq!(decision.reason, StopReason::HardCap);
        // R:R of 2 preserved against the capped 10-point risk.
        assert!(approx(decision.take_profit.unwrap(), 120.0));
    }

    #[test]
    fn hard_cap_for_short_scales_with_leverage() {
        let mut cfg = config();
        cfg.leverage = 5.0;
        let decision = apply_risk_cap(
            100.0,
            Side::Short,
            Proposal { stop_loss: Some(110.0), take_profit: Some(80.0) },
            &cfg,
        );
        // 10% of margin at 5x = 2% price move.
        assert!(approx(decision.stop_loss, 102.0));
        assert_eq!(decision.reason, StopReason::HardCap);
        // R:R 2 → 4 points below entry.
        assert!(approx(decision.take_profit.unwrap(), 96.0));
    }

    #[test]
    fn spot_ignores_leverage_for_cap() {
        let mut cfg = config();
        cfg.leverage = 5.0;
        cfg.market = crate::config::MarketType::Spot;
        assert!(approx(hard_cap_stop(100.0, Side::Long, 10.0, cfg.effective_leverage()), 90.0));
    }

    #[test]
    fn locked_user_stop_replaces_proposal() {
        let mut cfg = config();
        cfg.stop_loss = Some(LevelConfig { mode: LevelMode::Percent, value: 3.0, locked: true });
        let decision = apply_risk_cap(
            100.0,
            Side::Long,
            Proposal { stop_loss: Some(95.0), take_profit: None },
            &cfg,
        );
        assert!(approx(decision.stop_loss, 97.0));
        assert_eq!(decision.reason, StopReason::AgentLogic);
    }

    #[test]
    fn unlocked_user_levels_are_fallbacks() {
        let mut cfg = config();
        cfg.stop_loss = Some(LevelConfig { mode: LevelMode::Percent, value: 4.0, locked: false });
        cfg.take_profit = Some(LevelConfig { mode: LevelMode::Percent, value: 8.0, locked: false });

        let fallback = apply_risk_cap(100.0, Side::Long, Proposal::default(), &cfg);
        assert!(approx(fallback.stop_loss, 96.0));
        assert!(approx(fallback.take_profit.unwrap(), 108.0));

        let proposed = apply_risk_cap(
            100.0,
            Side::Long,
            Proposal { stop_loss: Some(98.0), take_profit: Some(103.0) },
            &cfg,
        );
        assert_eq!(proposed.stop_loss, 98.0);
        assert_eq!(proposed.take_profit, Some(103.0));
    }

    #[test]
    fn locked_take_profit_survives_cap() {
        let mut cfg = config();
        cfg.take_profit = Some(LevelConfig { mode: LevelMode::Price, value: 130.0, locked: true });
        let decision = apply_risk_cap(
            100.0,
            Side::Long,
            Proposal { stop_loss: Some(60.0), take_profit: Some(200.0) },
            &cfg,
        );
        assert_eq!(decision.reason, StopReason::HardCap);
        assert_eq!(decision.take_profit, Some(130.0));
    }

    #[test]
    fn capped_locked_stop_keeps_strategy_risk_reward() {
        let mut cfg = config();
        cfg.stop_loss = Some(LevelConfig { mode: LevelMode::Price, value: 50.0, locked: true });
        let decision = apply_risk_cap(
            100.0,
            Side::Long,
            Proposal { stop_loss: Some(95.0), take_profit: Some(110.0) },
            &cfg,
        );
        assert!(approx(decision.stop_loss, 90.0));
        assert_eq!(decision.reason, StopReason::HardCap);
        // Strategy R:R is 10/5 = 2, not the locked stop's 10/50.
        assert!(approx(decision.take_profit.unwrap(), 120.0));
    }

    #[test]
    fn capped_fallback_stop_uses_its_own_risk_reward() {
        let mut cfg = config();
        cfg.stop_loss = Some(LevelConfig { mode: LevelMode::Price, value: 80.0, locked: false });
        cfg.take_profit = Some(LevelConfig { mode: LevelMode::Price, value: 140.0, locked: false });
        let decision = apply_risk_cap(100.0, Side::Short, Proposal::default(), &cfg);
        // Levels on the wrong side for a short are ignored.
        assert!(approx(decision.stop_loss, 110.0));
        assert_eq!(decision.take_profit, None);

        let decision = apply_risk_cap(100.0, Side::Long, Proposal::default(), &cfg);
        assert!(approx(decision.stop_loss, 90.0));
        assert_eq!(decision.reason, StopReason::HardCap);
        // No strategy stop: R:R 40/20 = 2 from the user fallback stop.
        assert!(approx(decision.take_profit.unwrap(), 120.0));
    }

    #[test]
    fn missing_or_invalid_stop_falls_back_to_cap() {
        let none = apply_risk_cap(100.0, Side::Long, Proposal::default(), &config());
        assert!(approx(none.stop_loss, 90.0));
        assert_eq!(none.reason, StopReason::HardCap);

        // Stop above a long entry is on the wrong side.
        let wrong = apply_risk_cap(
            100.0,
            Side::Long,
            Proposal { stop_loss: Some(101.0), take_profit: Some(99.0) },
            &config(),
        );
        assert!(approx(wrong.stop_loss, 90.0));
        assert_eq!(wrong.take_profit, None);
    }

    #[test]
    fn stop_equal_to_cap_keeps_agent_reason() {
        let decision = apply_risk_cap(
            100.0,
            Side::Long,
            Proposal { stop_loss: Some(90.0), take_profit: None },
            &config(),
        );
        assert_eq!(decision.reason, StopReason::AgentLogic);
    }
}
