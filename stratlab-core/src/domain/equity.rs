use serde::{Deserialize, Serialize};

/// Equity at the close of one processed primary bar:
/// realized equity plus the open position's unrealized PnL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquitySample {
    pub time: i64,
    pub equity: f64,
}
