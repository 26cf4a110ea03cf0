//! Candle loading for the runner.
//!
//! Two sources, selected by [`DataConfig`]:
//! 1. CSV files (`open_time,open,high,low,close,volume`), validated on load
//! 2. A seeded random walk, optionally generated on a finer management
//!    timeframe and resampled up to the primary one
//!
//! Synthetic data is deterministic: the same seed always yields the same
//! candles, so results on it are reproducible.

use std::io::Read;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::info;

use stratlab_core::domain::{resample, validate_series, Candle, CandleError, Timeframe};
use stratlab_core::engine::MarketData;

use crate::config::DataConfig;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed candle CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid candle series: {0}")]
    Candles(#[from] CandleError),
    #[error("no candles in {0}")]
    Empty(String),
    #[error("management timeframe {management} must be finer than primary {primary}")]
    ManagementTimeframe {
        management: Timeframe,
        primary: Timeframe,
    },
}

/// Candles for one run.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub primary: Vec<Candle>,
    /// Empty when no finer series was supplied.
    pub management: Vec<Candle>,
    /// BLAKE3 over every candle, for provenance.
    pub dataset_hash: String,
    pub synthetic: bool,
}

impl LoadedData {
    pub fn new(primary: Vec<Candle>, management: Vec<Candle>, synthetic: bool) -> Self {
        let dataset_hash = compute_dataset_hash(&primary, &management);
        Self {
            primary,
            management,
            dataset_hash,
            synthetic,
        }
    }

    pub fn market_data(&self) -> MarketData<'_> {
        MarketData::new(&self.primary, &self.management)
    }
}

/// Load candles described by `data` for a run on `timeframe`.
pub fn load(data: &DataConfig, timeframe: Timeframe) -> Result<LoadedData, LoadError> {
    let loaded = match data {
        DataConfig::Csv {
            primary,
            management,
        } => {
            let primary = load_csv(primary)?;
            let management = match management {
                Some(path) => load_csv(path)?,
                None => Vec::new(),
            };
            LoadedData::new(primary, management, false)
        }
        DataConfig::Synthetic {
            bars,
            seed,
            start_price,
            management_timeframe,
        } => match management_timeframe {
            Some(fine) => {
                if fine.duration_ms() >= timeframe.duration_ms() {
                    return Err(LoadError::ManagementTimeframe {
                        management: *fine,
                        primary: timeframe,
                    });
                }
                let per_bar = (timeframe.duration_ms() / fine.duration_ms()) as usize;
                let management = generate_synthetic(bars * per_bar, *fine, *seed, *start_price);
                let primary = resample(&management, timeframe);
                LoadedData::new(primary, management, true)
            }
            None => LoadedData::new(
                generate_synthetic(*bars, timeframe, *seed, *start_price),
                Vec::new(),
                true,
            ),
        },
    };

    info!(
        primary = loaded.primary.len(),
        management = loaded.management.len(),
        synthetic = loaded.synthetic,
        "candles loaded"
    );
    Ok(loaded)
}

/// Read and validate a candle CSV file.
pub fn load_csv(path: &Path) -> Result<Vec<Candle>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let candles = read_candles(file)?;
    if candles.is_empty() {
        return Err(LoadError::Empty(path.display().to_string()));
    }
    Ok(candles)
}

/// Parse candles from CSV with a header row, then validate the series.
pub fn read_candles<R: Read>(reader: R) -> Result<Vec<Candle>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let candles = rdr
        .deserialize::<Candle>()
        .collect::<Result<Vec<_>, _>>()?;
    validate_series(&candles)?;
    Ok(candles)
}

/// Seeded random walk from `start_price`, one candle per `timeframe`
/// starting at 2024-01-01T00:00Z.
pub fn generate_synthetic(
    bars: usize,
    timeframe: Timeframe,
    seed: u64,
    start_price: f64,
) -> Vec<Candle> {
    const START_MS: i64 = 1_704_067_200_000;

    let mut rng = StdRng::seed_from_u64(seed);
    let step = timeframe.duration_ms();
    // Scale per-bar volatility with the square root of the interval.
    let vol = 0.004 * (step as f64 / 3_600_000.0).sqrt();

    let mut price = start_price.max(f64::MIN_POSITIVE);
    (0..bars)
        .map(|i| {
            let ret: f64 = rng.gen_range(-vol..vol);
            let open = price;
            let close = price * (1.0 + ret);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..vol / 2.0));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..vol / 2.0));
            let volume = rng.gen_range(100.0..10_000.0);
            price = close;
            Candle::new(START_MS + i as i64 * step, open, high, low, close, volume)
        })
        .collect()
}

fn compute_dataset_hash(primary: &[Candle], management: &[Candle]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (tag, series) in [(b"p", primary), (b"m", management)] {
        hasher.update(tag);
        for c in series {
            hasher.update(&c.open_time.to_le_bytes());
            for v in [c.open, c.high, c.low, c.close, c.volume] {
                hasher.update(&v.to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "open_time,open,high,low,close,volume\n\
                       0,100,101,99,100.5,10\n\
                       3600000,100.5,102,100,101,12\n\
                       7200000,101,101.5,98,99,9\n";

    #[test]
    fn reads_csv_candles() {
        let candles = read_candles(CSV.as_bytes()).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[1].open_time, 3_600_000);
        assert_eq!(candles[2].low, 98.0);
    }

    #[test]
    fn rejects_out_of_order_rows() {
        let text = "open_time,open,high,low,close,volume\n\
                    3600000,100,101,99,100,1\n\
                    0,100,101,99,100,1\n";
        assert!(matches!(
            read_candles(text.as_bytes()),
            Err(LoadError::Candles(CandleError::OutOfOrder { .. }))
        ));
    }

    #[test]
    fn rejects_insane_rows() {
        let text = "open_time,open,high,low,close,volume\n0,100,99,101,100,1\n";
        assert!(matches!(
            read_candles(text.as_bytes()),
            Err(LoadError::Candles(CandleError::Insane { .. }))
        ));
    }

    #[test]
    fn rejects_malformed_rows() {
        let text = "open_time,open,high,low,close,volume\n0,abc,101,99,100,1\n";
        assert!(matches!(read_candles(text.as_bytes()), Err(LoadError::Csv(_))));
    }

    #[test]
    fn load_csv_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        let candles = load_csv(file.path()).unwrap();
        assert_eq!(candles.len(), 3);
    }

    #[test]
    fn header_only_file_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"open_time,open,high,low,close,volume\n").unwrap();
        assert!(matches!(load_csv(file.path()), Err(LoadError::Empty(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_csv(Path::new("/nonexistent/bars.csv")),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn synthetic_is_deterministic_and_sane() {
        let a = generate_synthetic(500, Timeframe::H1, 7, 100.0);
        let b = generate_synthetic(500, Timeframe::H1, 7, 100.0);
        assert_eq!(a, b);
        assert!(validate_series(&a).is_ok());

        let c = generate_synthetic(500, Timeframe::H1, 8, 100.0);
        assert_ne!(a, c);
    }

    #[test]
    fn synthetic_with_management_resamples() {
        let data = DataConfig::Synthetic {
            bars: 50,
            seed: 1,
            start_price: 100.0,
            management_timeframe: Some(Timeframe::M15),
        };
        let loaded = load(&data, Timeframe::H1).unwrap();
        assert_eq!(loaded.management.len(), 200);
        assert_eq!(loaded.primary.len(), 50);
        assert_eq!(loaded.primary[0].open, loaded.management[0].open);
        assert_eq!(loaded.primary[0].close, loaded.management[3].close);
        assert!(loaded.synthetic);
    }

    #[test]
    fn management_must_be_finer() {
        let data = DataConfig::Synthetic {
            bars: 10,
            seed: 1,
            start_price: 100.0,
            management_timeframe: Some(Timeframe::H4),
        };
        assert!(matches!(
            load(&data, Timeframe::H1),
            Err(LoadError::ManagementTimeframe { .. })
        ));
    }

    #[test]
    fn dataset_hash_tracks_content() {
        let candles = generate_synthetic(20, Timeframe::H1, 3, 100.0);
        let a = LoadedData::new(candles.clone(), Vec::new(), true);
        let b = LoadedData::new(candles.clone(), Vec::new(), true);
        assert_eq!(a.dataset_hash, b.dataset_hash);

        let mut changed = candles;
        changed[5].close += 0.01;
        let c = LoadedData::new(changed, Vec::new(), true);
        assert_ne!(a.dataset_hash, c.dataset_hash);
    }
}
