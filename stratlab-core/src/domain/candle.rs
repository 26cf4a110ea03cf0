//! Candle: the fundamental market data unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OHLCV aggregate over one fixed interval, keyed by its start time in
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(open_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Basic OHLC sanity check: finite, positive, high/low bracket open and close.
    pub fn is_sane(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite();
        finite
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    /// True if `price` lies within this candle's high/low range (inclusive).
    pub fn touches(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Problems found while validating a candle series.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CandleError {
    #[error("candle {index} at {open_time} fails OHLC sanity checks")]
    Insane { index: usize, open_time: i64 },
    #[error("candle {index} at {open_time} is not after previous candle at {previous}")]
    OutOfOrder {
        index: usize,
        open_time: i64,
        previous: i64,
    },
    #[error("unknown timeframe '{0}'")]
    UnknownTimeframe(String),
}

/// Validate a candle series: every candle sane, timestamps strictly increasing.
pub fn validate_series(candles: &[Candle]) -> Result<(), CandleError> {
    for (index, candle) in candles.iter().enumerate() {
        if !candle.is_sane() {
            return Err(CandleError::Insane {
                index,
                open_time: candle.open_time,
            });
        }
        if index > 0 {
            let previous = candles[index - 1].open_time;
            if candle.open_time <= previous {
                return Err(CandleError::OutOfOrder {
                    index,
                    open_time: candle.open_time,
                    previous,
                });
            }
        }
    }
    Ok(())
}

/// Candle interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Interval length in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Timeframe::M1 => MINUTE,
            Timeframe::M3 => 3 * MINUTE,
            Timeframe::M5 => 5 * MINUTE,
            Timeframe::M15 => 15 * MINUTE,
            Timeframe::M30 => 30 * MINUTE,
            Timeframe::H1 => 60 * MINUTE,
            Timeframe::H2 => 120 * MINUTE,
            Timeframe::H4 => 240 * MINUTE,
            Timeframe::D1 => 1_440 * MINUTE,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = CandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CandleError::UnknownTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = CandleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// Aggregate a finer series into `timeframe` buckets aligned on
/// `open_time / duration`. The last bucket may still be forming; callers
/// that need only completed buckets use [`completed_buckets`].
pub fn resample(candles: &[Candle], timeframe: Timeframe) -> Vec<Candle> {
    let duration = timeframe.duration_ms();
    let mut out: Vec<Candle> = Vec::new();

    for candle in candles {
        let bucket_start = candle.open_time.div_euclid(duration) * duration;
        match out.last_mut() {
            Some(current) if current.open_time == bucket_start => {
                current.high = current.high.max(candle.high);
                current.low = current.low.min(candle.low);
                current.close = candle.close;
                current.volume += candle.volume;
            }
            _ => out.push(Candle {
                open_time: bucket_start,
                ..*candle
            }),
        }
    }
    out
}

/// Number of leading buckets in `resampled` that have fully closed once a
/// source candle ending at `close_time` (exclusive, ms) is known.
pub fn completed_buckets(resampled: &[Candle], timeframe: Timeframe, close_time: i64) -> usize {
    let duration = timeframe.duration_ms();
    resampled.partition_point(|c| c.open_time + duration <= close_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle() -> Candle {
        Candle::new(0, 100.0, 105.0, 98.0, 103.0, 50_000.0)
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
    }

    #[test]
    fn candle_detects_nan() {
        let mut c = sample_candle();
        c.open = f64::NAN;
        assert!(!c.is_sane());
    }

    #[test]
    fn candle_detects_inverted_range() {
        let mut c = sample_candle();
        c.high = 97.0;
        assert!(!c.is_sane());
    }

    #[test]
    fn touches_is_inclusive() {
        let c = sample_candle();
        assert!(c.touches(98.0));
        assert!(c.touches(105.0));
        assert!(!c.touches(105.01));
    }

    #[test]
    fn validate_rejects_duplicate_timestamps() {
        let a = sample_candle();
        let b = sample_candle();
        let err = validate_series(&[a, b]).unwrap_err();
        assert!(matches!(err, CandleError::OutOfOrder { index: 1, .. }));
    }

    #[test]
    fn timeframe_parse_and_display() {
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!("4H".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert_eq!(Timeframe::D1.to_string(), "1d");
        assert!("7m".parse::<Timeframe>().is_err());
    }

    #[test]
    fn resample_merges_buckets() {
        let minute = Timeframe::M1.duration_ms();
        let candles: Vec<Candle> = (0..10)
            .map(|i| {
                let p = 100.0 + i as f64;
                Candle::new(i * minute, p, p + 1.0, p - 1.0, p + 0.5, 10.0)
            })
            .collect();
        let five = resample(&candles, Timeframe::M5);
        assert_eq!(five.len(), 2);
        assert_eq!(five[0].open, 100.0);
        assert_eq!(five[0].high, 105.0);
        assert_eq!(five[0].low, 99.0);
        assert_eq!(five[0].close, 104.5);
        assert_eq!(five[0].volume, 50.0);
        assert_eq!(five[1].open_time, 5 * minute);
    }

    #[test]
    fn completed_buckets_excludes_forming_bucket() {
        let minute = Timeframe::M1.duration_ms();
        let candles: Vec<Candle> = (0..7)
            .map(|i| Candle::new(i * minute, 100.0, 101.0, 99.0, 100.0, 1.0))
            .collect();
        let five = resample(&candles, Timeframe::M5);
        // Source candle 6 closes at 7 minutes: first bucket done, second forming.
        assert_eq!(completed_buckets(&five, Timeframe::M5, 7 * minute), 1);
        assert_eq!(completed_buckets(&five, Timeframe::M5, 10 * minute), 2);
    }
}
