//! Grid search over strategy parameters.
//!
//! Axes expand to discrete value lists; their Cartesian product is walked
//! lazily by an odometer iterator. Each combination is an independent run
//! dispatched to a private rayon pool. Results come back over an `mpsc`
//! channel and are merged in submission order, so the outcome never depends
//! on which worker finished first.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use stratlab_core::config::{BacktestConfig, ConfigError, ExecutionMode};
use stratlab_core::engine::MarketData;
use stratlab_core::strategy::{RegistryError, StrategyRegistry};

use crate::runner::{run_single, BacktestResult, RunError};

/// Default safety ceiling on the number of combinations.
pub const DEFAULT_MAX_COMBINATIONS: usize = 200;

/// Range expansions longer than this are treated as unbounded.
const MAX_AXIS_LEN: f64 = 1e9;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid range for '{name}': {reason}")]
    InvalidRange { name: String, reason: String },
    #[error("{count} combinations exceed the limit of {max}")]
    TooManyCombinations { count: usize, max: usize },
    #[error("unknown strategy id: {0}")]
    UnknownStrategy(u32),
    #[error("strategy '{strategy}' has no parameter '{name}'")]
    UnknownParam { strategy: String, name: String },
    #[error("combination rejected: {0}")]
    InvalidParam(#[from] RegistryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("live execution mode cannot be optimized")]
    LiveMode,
    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("run failed: {0}")]
    Run(#[from] RunError),
}

/// One swept parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamAxis {
    /// Inclusive `start..=end` in increments of `step`.
    Range {
        name: String,
        start: f64,
        end: f64,
        step: f64,
    },
    Values { name: String, values: Vec<f64> },
}

impl ParamAxis {
    pub fn range(name: &str, start: f64, end: f64, step: f64) -> Self {
        ParamAxis::Range {
            name: name.to_string(),
            start,
            end,
            step,
        }
    }

    pub fn values(name: &str, values: &[f64]) -> Self {
        ParamAxis::Values {
            name: name.to_string(),
            values: values.to_vec(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParamAxis::Range { name, .. } | ParamAxis::Values { name, .. } => name,
        }
    }

    /// Number of values, after validating the axis.
    pub fn len(&self) -> Result<usize, SweepError> {
        match self {
            ParamAxis::Range {
                start, end, step, ..
            } => {
                if !(start.is_finite() && end.is_finite() && step.is_finite()) {
                    return Err(self.invalid("bounds and step must be finite"));
                }
                if *step <= 0.0 {
                    return Err(self.invalid(&format!("step must be positive, got {step}")));
                }
                if end < start {
                    return Err(self.invalid(&format!("end {end} is below start {start}")));
                }
                let steps = ((end - start) / step + 1e-9).floor();
                if steps >= MAX_AXIS_LEN {
                    return Ok(usize::MAX);
                }
                Ok(steps as usize + 1)
            }
            ParamAxis::Values { values, .. } => {
                if values.is_empty() {
                    return Err(self.invalid("value list is empty"));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(self.invalid("values must be finite"));
                }
                Ok(values.len())
            }
        }
    }

    /// Concrete values. Range points are computed as `start + i * step`
    /// and rounded to nine decimals so `0.1` steps don't drift.
    pub fn expand(&self) -> Result<Vec<f64>, SweepError> {
        let len = self.len()?;
        Ok(match self {
            ParamAxis::Range { start, step, .. } => (0..len)
                .map(|i| ((start + i as f64 * step) * 1e9).round() / 1e9)
                .collect(),
            ParamAxis::Values { values, .. } => values.clone(),
        })
    }

    fn invalid(&self, reason: &str) -> SweepError {
        SweepError::InvalidRange {
            name: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Lazy Cartesian product of expanded axes; the last axis varies fastest.
pub struct Combinations<'a> {
    axes: &'a [(String, Vec<f64>)],
    cursor: Vec<usize>,
    done: bool,
}

impl<'a> Combinations<'a> {
    pub fn new(axes: &'a [(String, Vec<f64>)]) -> Self {
        Self {
            axes,
            cursor: vec![0; axes.len()],
            done: axes.iter().any(|(_, values)| values.is_empty()),
        }
    }
}

impl<'a> Iterator for Combinations<'a> {
    type Item = Vec<(&'a str, f64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self
            .axes
            .iter()
            .zip(&self.cursor)
            .map(|((name, values), &i)| (name.as_str(), values[i]))
            .collect();

        // Advance the odometer.
        self.done = true;
        for pos in (0..self.cursor.len()).rev() {
            self.cursor[pos] += 1;
            if self.cursor[pos] < self.axes[pos].1.len() {
                self.done = false;
                break;
            }
            self.cursor[pos] = 0;
        }
        Some(item)
    }
}

/// Sweep settings, the `[optimize]` section of a run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub axes: Vec<ParamAxis>,
    #[serde(default = "default_max_combinations")]
    pub max_combinations: usize,
    /// Worker threads; available parallelism when unset. 1 runs inline.
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_max_combinations() -> usize {
    DEFAULT_MAX_COMBINATIONS
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            axes: Vec::new(),
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            workers: None,
        }
    }
}

impl SweepConfig {
    pub fn new(axes: Vec<ParamAxis>) -> Self {
        Self {
            axes,
            ..Self::default()
        }
    }

    fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .max(1)
    }

    /// Validate every axis and return the combination count.
    pub fn combination_count(&self) -> Result<usize, SweepError> {
        let mut seen = BTreeSet::new();
        let mut count: usize = 1;
        for axis in &self.axes {
            if !seen.insert(axis.name()) {
                return Err(axis.invalid("axis appears more than once"));
            }
            count = count.saturating_mul(axis.len()?);
        }
        Ok(count)
    }
}

/// Sent to the progress callback after every completed combination.
#[derive(Debug, Clone, Copy)]
pub struct SweepProgress<'a> {
    pub completed: usize,
    pub total: usize,
    /// `completed / total * 100`; non-decreasing, 100 on the last call.
    pub percent: f64,
    pub latest: &'a BacktestResult,
}

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Completed runs in submission order.
    pub results: Vec<BacktestResult>,
    /// Indices into `results` with at least one trade, best first.
    pub ranked: Vec<usize>,
    pub cancelled: bool,
    /// Combinations in the full grid.
    pub total: usize,
}

impl SweepOutcome {
    pub fn ranked_results(&self) -> impl Iterator<Item = &BacktestResult> {
        self.ranked.iter().map(|&i| &self.results[i])
    }

    pub fn best(&self) -> Option<&BacktestResult> {
        self.ranked_results().next()
    }
}

/// Indices of results with trades, sorted by profit factor then total PnL,
/// both descending. Ties keep submission order.
pub fn rank(results: &[BacktestResult]) -> Vec<usize> {
    let mut ranked: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.report.total_trades > 0)
        .map(|(i, _)| i)
        .collect();
    ranked.sort_by(|&a, &b| {
        let (a, b) = (&results[a].report, &results[b].report);
        b.profit_factor
            .total_cmp(&a.profit_factor)
            .then(b.total_pnl.total_cmp(&a.total_pnl))
    });
    ranked
}

/// Run every combination of `sweep.axes` applied on top of `base`.
///
/// Fails before simulating anything when the strategy is unknown, an axis
/// is malformed, a combination is rejected by the strategy's builder or the
/// grid exceeds `sweep.max_combinations`. `cancel` is
/// checked before each combination starts; a cancelled sweep returns the
/// runs that already finished.
pub fn run_sweep<F>(
    data: MarketData<'_>,
    base: &BacktestConfig,
    sweep: &SweepConfig,
    registry: &StrategyRegistry,
    cancel: &AtomicBool,
    mut on_progress: F,
) -> Result<SweepOutcome, SweepError>
where
    F: FnMut(SweepProgress<'_>),
{
    base.validate()?;
    if base.execution_mode == ExecutionMode::Live {
        return Err(SweepError::LiveMode);
    }
    let strategy = registry
        .info(base.strategy_id)
        .map_err(|_| SweepError::UnknownStrategy(base.strategy_id))?;
    if let Some(axis) = sweep
        .axes
        .iter()
        .find(|axis| !strategy.params.iter().any(|p| *p == axis.name()))
    {
        return Err(SweepError::UnknownParam {
            strategy: strategy.name.to_string(),
            name: axis.name().to_string(),
        });
    }

    let total = sweep.combination_count()?;
    if total > sweep.max_combinations {
        return Err(SweepError::TooManyCombinations {
            count: total,
            max: sweep.max_combinations,
        });
    }
    let axes = sweep
        .axes
        .iter()
        .map(|axis| Ok((axis.name().to_string(), axis.expand()?)))
        .collect::<Result<Vec<_>, SweepError>>()?;
    for combo in Combinations::new(&axes) {
        registry.build(base.strategy_id, &base.with_params(combo).params)?;
    }

    let workers = sweep.worker_count().min(total.max(1));
    info!(
        strategy = strategy.name,
        combinations = total,
        workers,
        "sweep started"
    );

    let mut slots: Vec<Option<BacktestResult>> = (0..total).map(|_| None).collect();
    let mut completed = 0usize;
    let mut record = |index: usize, result: BacktestResult, slots: &mut Vec<Option<BacktestResult>>| {
        completed += 1;
        on_progress(SweepProgress {
            completed,
            total,
            percent: completed as f64 / total as f64 * 100.0,
            latest: &result,
        });
        slots[index] = Some(result);
    };

    if workers <= 1 {
        for (index, combo) in Combinations::new(&axes).enumerate() {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let config = base.with_params(combo);
            let result = run_single(data, &config, registry)?;
            record(index, result, &mut slots);
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("stratlab-sweep-{i}"))
            .build()?;
        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<(usize, Result<BacktestResult, RunError>)>();
        let mut failure = None;

        std::thread::scope(|outer| {
            let axes = &axes;
            let abort = &abort;
            let pool = &pool;
            outer.spawn(move || {
                pool.scope(|s| {
                    for (index, combo) in Combinations::new(axes).enumerate() {
                        let config = base.with_params(combo);
                        let tx = tx.clone();
                        s.spawn(move |_| {
                            if cancel.load(Ordering::Relaxed) || abort.load(Ordering::Relaxed) {
                                return;
                            }
                            // Receiver outlives every sender.
                            let _ = tx.send((index, run_single(data, &config, registry)));
                        });
                    }
                });
                drop(tx);
            });

            for (index, result) in rx {
                match result {
                    Ok(result) => record(index, result, &mut slots),
                    Err(err) => {
                        abort.store(true, Ordering::Relaxed);
                        failure.get_or_insert(err);
                    }
                }
            }
        });

        if let Some(err) = failure {
            return Err(err.into());
        }
    }

    let results: Vec<BacktestResult> = slots.into_iter().flatten().collect();
    let cancelled = results.len() < total;
    if cancelled {
        warn!(completed = results.len(), total, "sweep cancelled");
    }
    let ranked = rank(&results);
    info!(
        completed = results.len(),
        with_trades = ranked.len(),
        "sweep finished"
    );

    Ok(SweepOutcome {
        results,
        ranked,
        cancelled,
        total,
    })
}
