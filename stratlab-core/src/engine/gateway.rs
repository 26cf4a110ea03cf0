//! Order execution gateway for live management.
//!
//! The engine never retries: a failed order aborts the entry, exit or
//! partial fill that requested it, and the position state is left unchanged.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Order side that opens (or adds to) a position on `side`.
    pub fn opening(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces a position on `side`.
    pub fn closing(side: Side) -> Self {
        Self::opening(side.opposite())
    }
}

/// Exchange acknowledgement of a market order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    pub order_id: String,
    pub executed_quantity: f64,
    pub avg_price: Option<f64>,
    pub cumulative_quote: Option<f64>,
}

impl OrderReport {
    /// Average fill price: reported directly, or quote value over quantity.
    pub fn fill_price(&self) -> Option<f64> {
        self.avg_price
            .filter(|p| *p > 0.0 && p.is_finite())
            .or_else(|| {
                self.cumulative_quote
                    .filter(|_| self.executed_quantity > 0.0)
                    .map(|quote| quote / self.executed_quantity)
            })
            .filter(|p| *p > 0.0 && p.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

pub trait OrderGateway {
    fn place_order(
        &mut self,
        pair: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderReport, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_price_prefers_average() {
        let report = OrderReport {
            order_id: "1".into(),
            executed_quantity: 2.0,
            avg_price: Some(101.0),
            cumulative_quote: Some(250.0),
        };
        assert_eq!(report.fill_price(), Some(101.0));
    }

    #[test]
    fn fill_price_from_quote_value() {
        let report = OrderReport {
            order_id: "2".into(),
            executed_quantity: 2.0,
            avg_price: None,
            cumulative_quote: Some(201.0),
        };
        assert_eq!(report.fill_price(), Some(100.5));

        let empty = OrderReport {
            executed_quantity: 0.0,
            ..report
        };
        assert_eq!(empty.fill_price(), None);
    }

    #[test]
    fn closing_side_is_opposite() {
        assert_eq!(OrderSide::opening(Side::Long), OrderSide::Buy);
        assert_eq!(OrderSide::closing(Side::Long), OrderSide::Sell);
        assert_eq!(OrderSide::closing(Side::Short), OrderSide::Buy);
    }
}
