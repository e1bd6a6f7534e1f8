// =============================================================================
// Quantity Normalizer — clamp order sizes to the symbol's exchange filters
// =============================================================================
//
//   effective = max(desired, minQty)
//   if effective * price < minNotional  ->  effective = minNotional / price
//   effective = floor(effective / stepSize) * stepSize
//
// There is no error path: callers must accept a quantity larger than the one
// they asked for. Final rounding down can leave the notional up to one step
// below the minimum; `check_filters` tolerates exactly that.
// =============================================================================

use crate::error::{ExchangeError, ExchangeResult};
use crate::types::ExchangeFilters;

/// Absorbs float error when dividing by a step (0.3 / 0.1 = 2.9999999999999996).
const STEP_EPSILON: f64 = 1e-9;

/// Decimal precision used when a step or tick is unconstrained.
const MAX_DECIMALS: u32 = 8;

/// Round `value` to `decimals` places (half away from zero).
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Round to 8 decimal places, the precision of every BTC-denominated amount.
pub fn round8(value: f64) -> f64 {
    round_to(value, 8)
}

/// Number of decimals a step size carries (`0.001` -> 3, `1.0` -> 0).
pub fn step_decimals(step: f64) -> u32 {
    if step <= 0.0 {
        return MAX_DECIMALS;
    }
    let mut scaled = step;
    let mut decimals = 0;
    while decimals < MAX_DECIMALS && (scaled - scaled.round()).abs() > STEP_EPSILON {
        scaled *= 10.0;
        decimals += 1;
    }
    decimals
}

/// Round `value` down to a multiple of `step`.
pub fn floor_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return round_to(value, MAX_DECIMALS);
    }
    let steps = (value / step + STEP_EPSILON).floor();
    round_to(steps * step, step_decimals(step))
}

/// Clamp `desired` to the filters for an order priced at `price`.
pub fn normalize(desired: f64, price: f64, filters: &ExchangeFilters) -> f64 {
    let mut effective = desired.max(filters.min_qty);
    if price > 0.0 && effective * price < filters.min_notional {
        effective = filters.min_notional / price;
    }
    floor_to_step(effective, filters.step_size)
}

/// Round a limit price down to the symbol's tick size.
pub fn normalize_price(price: f64, filters: &ExchangeFilters) -> f64 {
    floor_to_step(price, filters.tick_size)
}

/// Verify a normalised quantity against the filters.
///
/// The notional check allows one step of slack for the final round-down.
pub fn check_filters(qty: f64, price: f64, filters: &ExchangeFilters) -> ExchangeResult<()> {
    if qty <= 0.0 {
        return Err(ExchangeError::ConstraintViolation(format!(
            "quantity {qty} is not positive"
        )));
    }
    if qty + STEP_EPSILON < filters.min_qty {
        return Err(ExchangeError::ConstraintViolation(format!(
            "quantity {qty} below minQty {}",
            filters.min_qty
        )));
    }
    let notional_with_slack = (qty + filters.step_size) * price;
    if notional_with_slack + STEP_EPSILON < filters.min_notional {
        return Err(ExchangeError::ConstraintViolation(format!(
            "notional {} below minNotional {}",
            qty * price,
            filters.min_notional
        )));
    }
    Ok(())
}
