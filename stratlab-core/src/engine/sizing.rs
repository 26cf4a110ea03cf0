//! Quantity rounding for entries and partial exits.

/// Floor `quantity` to a multiple of `step_size`, then round to `precision`
/// decimals. Non-positive or non-finite inputs give 0.
pub fn round_quantity(quantity: f64, step_size: f64, precision: u32) -> f64 {
    if !(quantity.is_finite() && quantity > 0.0 && step_size > 0.0) {
        return 0.0;
    }
    // Absorb representation error so 10.0 / 0.001 does not floor to 9999.
    let steps = (quantity / step_size + 1e-9).floor();
    let scale = 10f64.powi(precision.min(15) as i32);
    (steps * step_size * scale).round() / scale
}

/// Size for a fixed notional at `price`: `notional / price` rounded down to
/// the exchange step.
pub fn position_size(notional: f64, price: f64, step_size: f64, precision: u32) -> f64 {
    if !(price > 0.0 && price.is_finite()) {
        return 0.0;
    }
    round_quantity(notional / price, step_size, precision)
}
