//! Criterion benchmarks for StratLab hot paths.
//!
//! Benchmarks:
//! 1. Lifecycle engine over a full series (primary candles only)
//! 2. Lifecycle engine with a 4x finer management series
//! 3. Indicator computation (SMA, EMA, RSI, ATR, Donchian)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeMap;

use stratlab_core::config::{BacktestConfig, TrailingConfig};
use stratlab_core::cooldown::RsiExhaustion;
use stratlab_core::domain::Candle;
use stratlab_core::engine::{run_backtest, MarketData};
use stratlab_core::indicators::{Atr, Donchian, Ema, Indicator, Rsi, Sma};
use stratlab_core::strategy::StrategyRegistry;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_candles(n: usize, interval_ms: i64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Candle::new(
                i as i64 * interval_ms,
                open,
                close + 1.5,
                close - 1.5,
                close,
                1_000.0 + (i % 500) as f64,
            )
        })
        .collect()
}

fn bench_config() -> BacktestConfig {
    let mut params = BTreeMap::new();
    params.insert("fast".to_string(), 10.0);
    params.insert("slow".to_string(), 30.0);
    let mut config = BacktestConfig::new(1, 10_000.0);
    config.params = params;
    config.cooldown_enabled = true;
    config.trailing = Some(TrailingConfig {
        activation_pct: 1.0,
        distance_pct: 2.0,
    });
    config
}

// ── 1/2. Lifecycle engine ────────────────────────────────────────────

fn bench_lifecycle(c: &mut Criterion) {
    let config = bench_config();
    let registry = StrategyRegistry::builtin();
    let Ok(strategy) = registry.build(config.strategy_id, &config.params) else {
        return;
    };
    let exhaustion = RsiExhaustion::new(&config.exhaustion);
    let hour = config.timeframe.duration_ms();

    let mut group = c.benchmark_group("lifecycle");
    for n in [500, 1_000, 2_000] {
        let primary = make_candles(n, hour);
        let management = make_candles(n * 4, hour / 4);

        group.bench_with_input(BenchmarkId::new("primary_only", n), &primary, |b, primary| {
            b.iter(|| {
                run_backtest(
                    MarketData::primary_only(black_box(primary)),
                    &config,
                    &*strategy,
                    &exhaustion,
                )
            })
        });
        group.bench_with_input(BenchmarkId::new("with_management", n), &n, |b, _| {
            b.iter(|| {
                run_backtest(
                    MarketData::new(black_box(&primary), black_box(&management)),
                    &config,
                    &*strategy,
                    &exhaustion,
                )
            })
        });
    }
    group.finish();
}

// ── 3. Indicators ────────────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let candles = make_candles(5_000, 60_000);
    let indicators: Vec<Box<dyn Indicator>> = vec![
        Box::new(Sma::new(50)),
        Box::new(Ema::new(50)),
        Box::new(Rsi::new(14)),
        Box::new(Atr::new(14)),
        Box::new(Donchian::upper(20)),
        Box::new(Donchian::lower(20)),
    ];

    let mut group = c.benchmark_group("indicators");
    for indicator in &indicators {
        group.bench_function(indicator.name(), |b| {
            b.iter(|| indicator.compute(black_box(&candles)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lifecycle, bench_indicators);
criterion_main!(benches);
