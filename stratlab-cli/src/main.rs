//! StratLab CLI: backtest, optimize and strategy listing.
//!
//! Commands:
//! - `backtest`: run a single backtest from a TOML run file
//! - `optimize`: grid-search the run file's `[optimize]` axes
//! - `strategies`: list registered strategy ids and their parameters

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stratlab_core::strategy::StrategyRegistry;
use stratlab_runner::data_loader::load;
use stratlab_runner::export::{export_equity_csv, export_json, export_trades_csv, write_file};
use stratlab_runner::{run_single, run_sweep, BacktestResult, RunFile, SweepProgress};

#[derive(Parser)]
#[command(
    name = "stratlab",
    about = "Strategy backtesting and parameter optimization"
)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest from a TOML run file.
    Backtest {
        /// Path to the run file.
        #[arg(long)]
        config: PathBuf,

        /// Write the trade tape as CSV.
        #[arg(long)]
        trades_csv: Option<PathBuf>,

        /// Write the equity trace as CSV.
        #[arg(long)]
        equity_csv: Option<PathBuf>,

        /// Print the full result as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Grid-search the `[optimize]` axes of a run file.
    Optimize {
        /// Path to the run file.
        #[arg(long)]
        config: PathBuf,

        /// Worker threads (overrides the run file).
        #[arg(long)]
        workers: Option<usize>,

        /// Combination ceiling (overrides the run file).
        #[arg(long)]
        max_combinations: Option<usize>,

        /// Number of ranked results to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// List registered strategies.
    Strategies,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Backtest {
            config,
            trades_csv,
            equity_csv,
            json,
        } => run_backtest_cmd(config, trades_csv, equity_csv, json),
        Commands::Optimize {
            config,
            workers,
            max_combinations,
            top,
        } => run_optimize_cmd(config, workers, max_combinations, top),
        Commands::Strategies => {
            list_strategies();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_backtest_cmd(
    config_path: PathBuf,
    trades_csv: Option<PathBuf>,
    equity_csv: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let file = RunFile::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!(
        path = %config_path.display(),
        run_id = %file.backtest.run_id(),
        "run file loaded"
    );
    let data = load(&file.data, file.backtest.timeframe)?;
    let registry = StrategyRegistry::builtin();

    let result = run_single(data.market_data(), &file.backtest, &registry)?;

    if let Some(path) = trades_csv {
        write_file(&path, &export_trades_csv(&result.trades)?)?;
        eprintln!("Trades written to: {}", path.display());
    }
    if let Some(path) = equity_csv {
        write_file(&path, &export_equity_csv(&result.equity_curve)?)?;
        eprintln!("Equity written to: {}", path.display());
    }

    if json {
        println!("{}", export_json(&result)?);
    } else {
        print_summary(&result, data.synthetic);
    }
    Ok(())
}

fn run_optimize_cmd(
    config_path: PathBuf,
    workers: Option<usize>,
    max_combinations: Option<usize>,
    top: usize,
) -> Result<()> {
    let file = RunFile::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let Some(mut sweep) = file.optimize.clone() else {
        bail!("{} has no [optimize] section", config_path.display());
    };
    if workers.is_some() {
        sweep.workers = workers;
    }
    if let Some(max) = max_combinations {
        sweep.max_combinations = max;
    }

    let data = load(&file.data, file.backtest.timeframe)?;
    let registry = StrategyRegistry::builtin();
    let cancel = AtomicBool::new(false);

    let outcome = run_sweep(
        data.market_data(),
        &file.backtest,
        &sweep,
        &registry,
        &cancel,
        print_progress,
    )?;

    println!();
    println!(
        "=== Optimization: {} of {} combinations, {} with trades ===",
        outcome.results.len(),
        outcome.total,
        outcome.ranked.len()
    );
    if outcome.cancelled {
        println!("WARNING: sweep was cancelled before completion");
    }
    println!(
        "{:>4}  {:>8}  {:>12}  {:>7}  {:>8}  {:>8}  Params",
        "Rank", "PF", "Total PnL", "Trades", "Win %", "Sharpe"
    );
    println!("{}", "-".repeat(72));
    for (rank, result) in outcome.ranked_results().take(top).enumerate() {
        let r = &result.report;
        println!(
            "{:>4}  {:>8}  {:>12.2}  {:>7}  {:>8.1}  {:>8.3}  {}",
            rank + 1,
            format_profit_factor(r.profit_factor),
            r.total_pnl,
            r.total_trades,
            r.win_rate,
            r.sharpe_ratio,
            format_params(result)
        );
    }
    Ok(())
}

fn print_progress(progress: SweepProgress<'_>) {
    let r = &progress.latest.report;
    eprintln!(
        "[{:>5.1}%] {}/{}  {}  trades={} pf={} pnl={:.2}",
        progress.percent,
        progress.completed,
        progress.total,
        format_params(progress.latest),
        r.total_trades,
        format_profit_factor(r.profit_factor),
        r.total_pnl
    );
}

fn list_strategies() {
    let registry = StrategyRegistry::builtin();
    println!("{:>3}  {:<20} Params", "ID", "Name");
    println!("{}", "-".repeat(60));
    for info in registry.list() {
        println!("{:>3}  {:<20} {}", info.id, info.name, info.params.join(", "));
    }
}

fn format_params(result: &BacktestResult) -> String {
    let pairs: Vec<String> = result
        .params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    pairs.join(" ")
}

fn format_profit_factor(pf: f64) -> String {
    if pf.is_infinite() {
        "inf".to_string()
    } else {
        format!("{pf:.2}")
    }
}

fn print_summary(result: &BacktestResult, synthetic: bool) {
    let r = &result.report;
    let c = &result.counters;
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {} (id {})", result.strategy_name, result.strategy_id);
    println!("Run id:         {}", &result.run_id[..16.min(result.run_id.len())]);
    println!("Bars:           {}", result.bar_count);
    println!("Signals:        {}", c.signals_evaluated);
    println!("Vetoes:         {}", c.vetoes);
    println!("Skipped:        {}", c.entries_skipped);
    println!("Trades:         {}", r.total_trades);
    println!();
    println!("--- Performance ---");
    println!("Total PnL:      {:.2}", r.total_pnl);
    println!("Return:         {:.2}%", r.return_pct);
    println!("Final Equity:   {:.2}", r.final_equity);
    println!("Win Rate:       {:.1}%", r.win_rate);
    println!(
        "W / L / BE:     {} / {} / {}",
        r.wins, r.losses, r.break_evens
    );
    println!("Profit Factor:  {}", format_profit_factor(r.profit_factor));
    println!("Sharpe:         {:.3}", r.sharpe_ratio);
    println!(
        "Max Drawdown:   {:.2} ({:.2}%)",
        r.max_drawdown, r.max_drawdown_pct
    );
    println!("Avg Duration:   {}", r.average_trade_duration);
    println!("Max Consec Win: {}", r.max_consecutive_wins);
    println!("Max Consec Loss:{}", r.max_consecutive_losses);
    println!("Fees:           {:.2}", r.total_fees);
    if synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
