//! Position lifecycle state machine.
//!
//! The engine is FLAT or OPEN. Each primary candle is processed in four steps:
//!
//! 1. Start of bar: a signal from the previous close fills at this bar's open.
//! 2. Intrabar: each management tick runs the SL/TP check (stop-loss wins
//!    ties), partial take-profit rungs, the universal trailing stop and the
//!    strategy's `manage` hook.
//! 3. Close: when FLAT and nothing closed during this bar, the strategy is
//!    evaluated and the cooldown may veto the candidate entry.
//! 4. Mark-to-market: one equity sample.
//!
//! The same `step` drives bulk backtests and live pushes of closed candles.

use tracing::{debug, info, warn};

use super::gateway::{OrderGateway, OrderSide};
use super::sizing::{position_size, round_quantity};
use super::state::{RunCounters, RunResult};
use crate::config::BacktestConfig;
use crate::cooldown::{Cooldown, CooldownVerdict, ExhaustionCheck};
use crate::domain::{
    completed_buckets, resample, Candle, EquitySample, ExitReason, Position, Side, StopReason,
    TpRung, Trade,
};
use crate::risk::{apply_risk_cap, Proposal};
use crate::strategy::{Signal, Strategy};

/// Signal accepted at a bar close, waiting for the next open.
#[derive(Debug, Clone)]
struct PendingEntry {
    side: Side,
    proposal: Proposal,
    reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct Fill {
    price: f64,
    quantity: f64,
}

pub struct LifecycleEngine<'a> {
    config: &'a BacktestConfig,
    strategy: &'a dyn Strategy,
    exhaustion: &'a dyn ExhaustionCheck,
    gateway: Option<&'a mut dyn OrderGateway>,

    history: Vec<Candle>,
    position: Option<Position>,
    pending: Option<PendingEntry>,
    cooldown: Cooldown,
    /// Starting capital plus the net PnL of every closed trade.
    closed_equity: f64,

    trades: Vec<Trade>,
    equity_curve: Vec<EquitySample>,
    counters: RunCounters,
}

impl<'a> LifecycleEngine<'a> {
    pub fn new(
        config: &'a BacktestConfig,
        strategy: &'a dyn Strategy,
        exhaustion: &'a dyn ExhaustionCheck,
    ) -> Self {
        Self {
            config,
            strategy,
            exhaustion,
            gateway: None,
            history: Vec::new(),
            position: None,
            pending: None,
            cooldown: Cooldown::new(config.cooldown_enabled),
            closed_equity: config.investment,
            trades: Vec::new(),
            equity_curve: Vec::new(),
            counters: RunCounters::default(),
        }
    }

    /// Route every entry and exit through `gateway` instead of simulating fills.
    pub fn with_gateway(mut self, gateway: &'a mut dyn OrderGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn history(&self) -> &[Candle] {
        &self.history
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquitySample] {
        &self.equity_curve
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// Process one closed primary candle and the management ticks inside it.
    ///
    /// With no ticks the primary candle itself is the only tick.
    pub fn step(&mut self, primary: Candle, ticks: &[Candle]) {
        self.counters.bars_processed += 1;

        if let Some(pending) = self.pending.take() {
            self.open(pending, primary.open, primary.open_time);
        }

        let mut closed_this_bar = false;
        if self.position.is_some() {
            let single = [primary];
            let ticks = if ticks.is_empty() { &single[..] } else { ticks };
            for tick in ticks {
                if self.manage_tick(tick) {
                    closed_this_bar = true;
                    break;
                }
            }
        }

        self.history.push(primary);

        // One event per bar: a bar that closed a trade cannot also signal.
        if self.position.is_none() && !closed_this_bar {
            self.evaluate();
        }

        let equity = self.mark_to_market(primary.close);
        self.equity_curve.push(EquitySample {
            time: primary.open_time,
            equity,
        });
    }

    /// Close any open position at the last close and return the run output.
    pub fn finish(mut self) -> RunResult {
        self.pending = None;
        if let Some(last) = self.history.last().copied() {
            if self.position.is_some()
                && self.close(last.close, last.open_time, ExitReason::EndOfBacktest, Vec::new())
            {
                if let Some(sample) = self.equity_curve.last_mut() {
                    sample.equity = self.closed_equity;
                }
            }
        }

        info!(
            strategy = self.strategy.name(),
            bars = self.counters.bars_processed,
            trades = self.trades.len(),
            vetoes = self.counters.vetoes,
            final_equity = self.closed_equity,
            "run finished"
        );

        RunResult {
            trades: self.trades,
            equity_curve: self.equity_curve,
            counters: self.counters,
            open_position: self.position,
        }
    }

    fn mark_to_market(&self, price: f64) -> f64 {
        self.closed_equity
            + self
                .position
                .as_ref()
                .map_or(0.0, |p| p.realized_pnl + p.unrealized_pnl(price))
    }

    // ── Signal evaluation ──

    fn evaluate(&mut self) {
        if self.history.len() < self.strategy.warmup_bars() {
            return;
        }

        let higher = self.higher_timeframe_history();
        let output = self.strategy.generate(
            &self.history,
            self.config.timeframe,
            self.config,
            higher.as_deref(),
        );
        self.counters.signals_evaluated += 1;

        let signal = match output.signal.side() {
            Some(side) if !self.config.allows(side) => Signal::Hold,
            _ => output.signal,
        };

        if self.cooldown.filter(signal, &self.history, self.exhaustion) == CooldownVerdict::Vetoed {
            self.counters.vetoes += 1;
            debug!(?signal, bar = self.history.len() - 1, "entry vetoed by exhaustion check");
            return;
        }

        if let Some(side) = signal.side() {
            self.pending = Some(PendingEntry {
                side,
                proposal: Proposal {
                    stop_loss: output.stop_loss,
                    take_profit: output.take_profit,
                },
                reasons: output.reasons,
            });
        }
    }

    /// Completed higher-timeframe candles, never the still-forming bucket.
    fn higher_timeframe_history(&self) -> Option<Vec<Candle>> {
        let timeframe = self.config.higher_timeframe?;
        let last = self.history.last()?;
        let close_time = last.open_time + self.config.timeframe.duration_ms();
        let mut resampled = resample(&self.history, timeframe);
        resampled.truncate(completed_buckets(&resampled, timeframe, close_time));
        Some(resampled)
    }

    // ── Order routing ──

    /// Simulated fill at `price`, or the gateway's fill. `None` aborts.
    fn execute(&mut self, side: OrderSide, quantity: f64, price: f64) -> Option<Fill> {
        let Some(gateway) = self.gateway.as_deref_mut() else {
            return Some(Fill { price, quantity });
        };
        match gateway.place_order(&self.config.pair, side, quantity) {
            Ok(report) => match report.fill_price() {
                Some(price) if report.executed_quantity > 0.0 => Some(Fill {
                    price,
                    quantity: report.executed_quantity,
                }),
                _ => {
                    warn!(order_id = %report.order_id, "order report without a fill");
                    self.counters.orders_rejected += 1;
                    None
                }
            },
            Err(err) => {
                warn!(%err, ?side, quantity, "order failed, operation aborted");
                self.counters.orders_rejected += 1;
                None
            }
        }
    }

    fn fee(&self, fill: Fill) -> f64 {
        fill.price * fill.quantity * self.config.fee_rate
    }

    // ── FLAT → OPEN ──

    fn open(&mut self, pending: PendingEntry, open_price: f64, time: i64) {
        let config = self.config;
        let leverage = config.effective_leverage();
        let quantity = position_size(
            config.investment * leverage,
            open_price,
            config.step_size,
            config.quantity_precision,
        );
        if quantity <= 0.0 {
            self.counters.entries_skipped += 1;
            debug!(side = %pending.side, open_price, "entry skipped: size rounds to zero");
            return;
        }

        let side = pending.side;
        let Some(fill) = self.execute(OrderSide::opening(side), quantity, open_price) else {
            return;
        };

        let decision = apply_risk_cap(fill.price, side, pending.proposal, config);
        let fee = self.fee(fill);
        let tp_ladder = config
            .partial_take_profits
            .iter()
            .map(|rung| TpRung {
                price: side.offset_favorable(fill.price, rung.distance_pct),
                fraction: rung.fraction,
                hit: false,
            })
            .collect();

        debug!(
            %side,
            entry = fill.price,
            size = fill.quantity,
            stop_loss = decision.stop_loss,
            take_profit = ?decision.take_profit,
            reason = ?decision.reason,
            "position opened"
        );

        self.position = Some(Position {
            side,
            entry_price: fill.price,
            entry_time: time,
            initial_size: fill.quantity,
            size: fill.quantity,
            leverage,
            invested: fill.price * fill.quantity / leverage,
            stop_loss: decision.stop_loss,
            take_profit: decision.take_profit,
            initial_stop_loss: decision.stop_loss,
            initial_take_profit: decision.take_profit,
            stop_reason: decision.reason,
            tp_ladder,
            realized_pnl: -fee,
            fees_paid: fee,
            entry_reasons: pending.reasons,
        });
    }

    // ── OPEN → OPEN / FLAT ──

    /// Returns true if the position closed on this tick.
    fn manage_tick(&mut self, tick: &Candle) -> bool {
        let Some(pos) = self.position.as_ref() else {
            return false;
        };

        let exit = if pos.stop_touched(tick) {
            let reason = match pos.stop_reason {
                StopReason::UniversalTrail | StopReason::AgentTrail => ExitReason::TrailingStop,
                StopReason::AgentLogic | StopReason::HardCap => ExitReason::StopLoss,
            };
            Some((pos.stop_loss, reason))
        } else {
            pos.take_profit
                .filter(|_| pos.take_profit_touched(tick))
                .map(|tp| (tp, ExitReason::TakeProfit))
        };
        if let Some((price, reason)) = exit {
            return self.close(price, tick.open_time, reason, Vec::new());
        }

        self.fill_partials(tick);
        self.trail(tick);
        self.apply_management(tick)
    }

    fn fill_partials(&mut self, tick: &Candle) {
        let rungs = match self.position.as_ref() {
            Some(pos) => pos.tp_ladder.len(),
            None => return,
        };
        for index in 0..rungs {
            let Some(pos) = self.position.as_ref() else {
                return;
            };
            let rung = pos.tp_ladder[index];
            let reached = match pos.side {
                Side::Long => tick.high >= rung.price,
                Side::Short => tick.low <= rung.price,
            };
            if rung.hit || !reached {
                continue;
            }

            let side = pos.side;
            let quantity = round_quantity(
                (rung.fraction * pos.initial_size).min(pos.size),
                self.config.step_size,
                self.config.quantity_precision,
            );
            // A rung never closes the whole position.
            if quantity <= 0.0 || quantity >= pos.size {
                if let Some(pos) = self.position.as_mut() {
                    pos.tp_ladder[index].hit = true;
                }
                continue;
            }

            let Some(fill) = self.execute(OrderSide::closing(side), quantity, rung.price) else {
                continue;
            };
            let fee = self.fee(fill);
            if let Some(pos) = self.position.as_mut() {
                let gross = pos.gross_pnl(fill.price, fill.quantity);
                pos.size -= fill.quantity;
                pos.realized_pnl += gross - fee;
                pos.fees_paid += fee;
                pos.tp_ladder[index].hit = true;
                self.counters.partial_fills += 1;
                debug!(%side, price = fill.price, quantity = fill.quantity, remaining = pos.size, "partial take-profit");
            }
        }
    }

    fn trail(&mut self, tick: &Candle) {
        let Some(trailing) = self.config.trailing else {
            return;
        };
        let Some(pos) = self.position.as_mut() else {
            return;
        };
        if pos.favorable_move_pct(tick.close) < trailing.activation_pct {
            return;
        }
        let candidate = pos.side.offset_adverse(tick.close, trailing.distance_pct);
        if pos.tighten_stop(candidate, StopReason::UniversalTrail) {
            debug!(stop_loss = candidate, "universal trailing stop moved");
        }
    }

    /// Strategy `manage` hook. Returns true if it closed the position.
    fn apply_management(&mut self, tick: &Candle) -> bool {
        let Some(pos) = self.position.as_ref() else {
            return false;
        };
        let out = self.strategy.manage(pos, &self.history, tick.close, self.config);
        if out.close_position {
            return self.close(tick.close, tick.open_time, ExitReason::StrategyClose, out.reasons);
        }

        let tp_locked = self.config.take_profit.is_some_and(|level| level.locked);
        let Some(pos) = self.position.as_mut() else {
            return false;
        };
        // Levels must stay on the correct side of the current price.
        if let Some(stop) = out.new_stop_loss {
            if pos.side.is_tighter_stop(tick.close, stop) && pos.tighten_stop(stop, StopReason::AgentTrail) {
                debug!(stop_loss = stop, "strategy trailed stop");
            }
        }
        if let Some(target) = out.new_take_profit {
            if !tp_locked && target.is_finite() && pos.side.is_tighter_stop(target, tick.close) {
                pos.take_profit = Some(target);
            }
        }
        false
    }

    /// OPEN → FLAT at `price`. Returns false if the exit order failed or
    /// only partly filled.
    fn close(&mut self, price: f64, time: i64, reason: ExitReason, reasons: Vec<String>) -> bool {
        let Some((side, size)) = self.position.as_ref().map(|p| (p.side, p.size)) else {
            return false;
        };
        let Some(fill) = self.execute(OrderSide::closing(side), size, price) else {
            return false;
        };
        let fill = Fill {
            price: fill.price,
            quantity: fill.quantity.min(size),
        };
        let residual = size - fill.quantity;
        if residual > size * 1e-9 {
            // Short fill: book what executed, keep the rest open.
            let fee = self.fee(fill);
            if let Some(pos) = self.position.as_mut() {
                pos.realized_pnl += pos.gross_pnl(fill.price, fill.quantity) - fee;
                pos.fees_paid += fee;
                pos.size = residual;
            }
            self.counters.partial_closes += 1;
            warn!(%side, filled = fill.quantity, residual, %reason, "exit partially filled, remainder stays open");
            return false;
        }
        let Some(pos) = self.position.take() else {
            return false;
        };

        let fee = self.fee(fill);
        let pnl = pos.realized_pnl + pos.gross_pnl(fill.price, fill.quantity) - fee;
        let fees = pos.fees_paid + fee;
        let exit_rationale = if reasons.is_empty() {
            reason.to_string()
        } else {
            format!("{reason}: {}", reasons.join("; "))
        };

        debug!(%side, exit = fill.price, %reason, pnl, "position closed");

        self.closed_equity += pnl;
        self.cooldown.on_close(side, pnl);
        self.trades.push(Trade {
            side,
            entry_time: pos.entry_time,
            entry_price: pos.entry_price,
            size: pos.initial_size,
            leverage: pos.leverage,
            invested_amount: pos.invested,
            margin_type: self.config.margin_type,
            initial_stop_loss: pos.initial_stop_loss,
            initial_take_profit: pos.initial_take_profit,
            stop_loss: pos.stop_loss,
            take_profit: pos.take_profit,
            stop_reason: pos.stop_reason,
            partial_fills: pos.tp_ladder.iter().filter(|r| r.hit).count(),
            exit_time: time,
            exit_price: fill.price,
            exit_reason: reason,
            gross_pnl: pnl + fees,
            fees,
            pnl,
            entry_rationale: pos.entry_reasons.join("; "),
            exit_rationale,
        });
        true
    }
}
