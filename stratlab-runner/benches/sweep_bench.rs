//! Criterion benchmarks for the runner's reducers and the grid search.
//!
//! Run with: `cargo bench -p stratlab-runner`

use std::sync::atomic::AtomicBool;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use stratlab_core::config::{BacktestConfig, MarginType};
use stratlab_core::domain::{EquitySample, ExitReason, Side, StopReason, Timeframe, Trade};
use stratlab_core::engine::MarketData;
use stratlab_core::strategy::StrategyRegistry;
use stratlab_runner::data_loader::generate_synthetic;
use stratlab_runner::{run_sweep, ParamAxis, PerformanceReport, SweepConfig};

fn make_trades(n: usize) -> Vec<Trade> {
    (0..n)
        .map(|i| {
            let pnl = ((i as f64) * 0.7).sin() * 25.0;
            Trade {
                side: if i % 2 == 0 { Side::Long } else { Side::Short },
                entry_time: i as i64 * 3_600_000,
                entry_price: 100.0,
                size: 1.0,
                leverage: 1.0,
                invested_amount: 100.0,
                margin_type: MarginType::Cross,
                initial_stop_loss: 95.0,
                initial_take_profit: None,
                stop_loss: 95.0,
                take_profit: None,
                stop_reason: StopReason::AgentLogic,
                partial_fills: 0,
                exit_time: (i as i64 + 3) * 3_600_000,
                exit_price: 100.0 + pnl,
                exit_reason: ExitReason::StrategyClose,
                gross_pnl: pnl,
                fees: 0.0,
                pnl,
                entry_rationale: String::new(),
                exit_rationale: String::new(),
            }
        })
        .collect()
}

fn bench_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("performance_report");
    for n in [100, 1_000, 10_000] {
        let trades = make_trades(n);
        let mut equity = 10_000.0;
        let curve: Vec<EquitySample> = trades
            .iter()
            .map(|t| {
                equity += t.pnl;
                EquitySample {
                    time: t.exit_time,
                    equity,
                }
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| PerformanceReport::compute(black_box(&trades), black_box(&curve), 10_000.0))
        });
    }
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let candles = generate_synthetic(1_000, Timeframe::H1, 7, 100.0);
    let mut base = BacktestConfig::new(1, 1_000.0);
    base.min_history_bars = 100;
    let registry = StrategyRegistry::builtin();
    let cancel = AtomicBool::new(false);

    let mut group = c.benchmark_group("sweep_3x4");
    group.sample_size(10);
    for workers in [1, 4] {
        let mut sweep = SweepConfig::new(vec![
            ParamAxis::values("fast", &[3.0, 5.0, 8.0]),
            ParamAxis::range("slow", 20.0, 50.0, 10.0),
        ]);
        sweep.workers = Some(workers);
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, _| {
            b.iter(|| {
                run_sweep(
                    MarketData::primary_only(&candles),
                    &base,
                    &sweep,
                    &registry,
                    &cancel,
                    |_| {},
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_report, bench_sweep);
criterion_main!(benches);
