//! Run files: TOML documents bundling a backtest configuration, its data
//! source and optional sweep settings.
//!
//! ```toml
//! [backtest]
//! strategy_id = 1
//! investment = 1000.0
//! timeframe = "1h"
//!
//! [backtest.params]
//! fast = 12.0
//! slow = 26.0
//!
//! [data]
//! source = "csv"
//! primary = "btc_1h.csv"
//!
//! [optimize]
//! axes = [
//!     { name = "fast", start = 8.0, end = 16.0, step = 4.0 },
//!     { name = "slow", values = [21.0, 26.0, 34.0] },
//! ]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::config::{BacktestConfig, ConfigError};
use stratlab_core::domain::Timeframe;

use crate::sweep::SweepConfig;

#[derive(Debug, Error)]
pub enum RunFileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid run file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Where candles come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataConfig {
    /// CSV files with an `open_time,open,high,low,close,volume` header.
    Csv {
        primary: PathBuf,
        /// Finer series for intrabar stop/target checks.
        #[serde(default)]
        management: Option<PathBuf>,
    },
    /// Seeded random walk.
    Synthetic {
        #[serde(default = "default_bars")]
        bars: usize,
        #[serde(default = "default_seed")]
        seed: u64,
        #[serde(default = "default_start_price")]
        start_price: f64,
        /// Generate at this finer timeframe and resample up to the primary
        /// one, keeping the fine series for management.
        #[serde(default)]
        management_timeframe: Option<Timeframe>,
    },
}

fn default_bars() -> usize {
    1_000
}

fn default_seed() -> u64 {
    42
}

fn default_start_price() -> f64 {
    100.0
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig::Synthetic {
            bars: default_bars(),
            seed: default_seed(),
            start_price: default_start_price(),
            management_timeframe: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub optimize: Option<SweepConfig>,
}

impl RunFile {
    /// Parse and validate a run file.
    pub fn from_toml(text: &str) -> Result<Self, RunFileError> {
        let file: RunFile = toml::from_str(text)?;
        file.backtest.validate()?;
        Ok(file)
    }

    /// Read and parse `path`. Relative CSV paths resolve against the run
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, RunFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| RunFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = Self::from_toml(&text)?;
        if let (Some(dir), DataConfig::Csv { primary, management }) = (path.parent(), &mut file.data) {
            *primary = dir.join(&*primary);
            if let Some(management) = management {
                *management = dir.join(&*management);
            }
        }
        Ok(file)
    }
}
