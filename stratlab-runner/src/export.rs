//! Result export: JSON and CSV artifacts.
//!
//! - **JSON**: full `BacktestResult` round trip with schema versioning
//! - **CSV**: trade tape and equity trace for external analysis tools
//!
//! Unknown (newer) schema versions are rejected on import.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use stratlab_core::domain::{EquitySample, Trade};

use crate::runner::{BacktestResult, SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported schema version {found} (max supported: {supported})")]
    Schema { found: u32, supported: u32 },
}

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn import_json(json: &str) -> Result<BacktestResult, ExportError> {
    let result: BacktestResult = serde_json::from_str(json)?;
    if result.schema_version > SCHEMA_VERSION {
        return Err(ExportError::Schema {
            found: result.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(result)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Trade tape, one row per closed trade. Times are RFC 3339 UTC.
pub fn export_trades_csv(trades: &[Trade]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "side",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "size",
        "leverage",
        "invested",
        "initial_stop_loss",
        "stop_loss",
        "take_profit",
        "stop_reason",
        "exit_reason",
        "partial_fills",
        "gross_pnl",
        "fees",
        "pnl",
        "entry_rationale",
        "exit_rationale",
    ])?;

    for t in trades {
        wtr.write_record([
            format!("{:?}", t.side),
            format_time(t.entry_time),
            format!("{:.6}", t.entry_price),
            format_time(t.exit_time),
            format!("{:.6}", t.exit_price),
            format!("{:.6}", t.size),
            format!("{}", t.leverage),
            format!("{:.2}", t.invested_amount),
            format!("{:.6}", t.initial_stop_loss),
            format!("{:.6}", t.stop_loss),
            t.take_profit.map(|tp| format!("{tp:.6}")).unwrap_or_default(),
            format!("{:?}", t.stop_reason),
            t.exit_reason.to_string(),
            t.partial_fills.to_string(),
            format!("{:.4}", t.gross_pnl),
            format!("{:.4}", t.fees),
            format!("{:.4}", t.pnl),
            t.entry_rationale.clone(),
            t.exit_rationale.clone(),
        ])?;
    }
    finish(wtr)
}

/// Equity trace with both raw millisecond and RFC 3339 times.
pub fn export_equity_csv(equity_curve: &[EquitySample]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time_ms", "time", "equity"])?;
    for sample in equity_curve {
        wtr.write_record([
            sample.time.to_string(),
            format_time(sample.time),
            format!("{:.4}", sample.equity),
        ])?;
    }
    finish(wtr)
}

pub fn write_file(path: &Path, contents: &str) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let data = wtr
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    // The writer only ever received UTF-8 strings.
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn format_time(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}
