//! Tick-size arithmetic for NSE equity prices.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::warn;

use crate::types::OrderSide;

/// Errors from pricing arithmetic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    /// Tick size must be strictly positive
    #[error("invalid tick size: {0}")]
    InvalidTickSize(Decimal),
}

/// Round a price to the nearest multiple of `tick_size`.
///
/// The result is re-quantized to the decimal places implied by the tick
/// size (a 0.05 tick yields two decimal places), so repeated rounding is
/// a no-op. Midpoints round half-to-even, matching exchange convention.
pub fn round_to_tick(price: Decimal, tick_size: Decimal) -> Result<Decimal, PricingError> {
    if tick_size <= Decimal::ZERO {
        return Err(PricingError::InvalidTickSize(tick_size));
    }
    let steps = (price / tick_size).round();
    Ok((steps * tick_size).round_dp(tick_size.scale()))
}

/// Round to tick, falling back to plain 2-decimal rounding when the tick
/// size is unusable. The fallback is logged; order placement can proceed
/// with paise precision rather than abort the whole pass.
pub fn round_to_tick_or_paise(price: Decimal, tick_size: Decimal) -> Decimal {
    match round_to_tick(price, tick_size) {
        Ok(p) => p,
        Err(e) => {
            warn!(%price, %tick_size, error = %e, "tick rounding failed, falling back to 2 decimals");
            price.round_dp(2)
        }
    }
}

/// Derive a (trigger_price, limit_price) pair from a base price and a
/// percentage drop.
///
/// The trigger sits `drop_pct` below the base, rounded to tick. For BUY
/// orders the limit sits `delta_ticks` above the trigger so the limit
/// order fills once triggered; for SELL orders it sits below.
pub fn trigger_and_limit(
    base_price: Decimal,
    drop_pct: Decimal,
    tick_size: Decimal,
    side: OrderSide,
    delta_ticks: u32,
) -> Result<(Decimal, Decimal), PricingError> {
    let target = base_price * (Decimal::ONE - drop_pct / dec!(100));
    let trigger_price = round_to_tick(target, tick_size)?;

    let delta = tick_size * Decimal::from(delta_ticks);
    let raw_limit = match side {
        OrderSide::Buy => trigger_price + delta,
        OrderSide::Sell => trigger_price - delta,
    };
    let limit_price = round_to_tick(raw_limit, tick_size)?;

    Ok((trigger_price, limit_price))
}

/// NSE price-band tick sizes.
///
/// The instrument master is the authoritative source when available;
/// this banded table is the documented fallback and must stay in sync
/// with the exchange circular:
/// below 250 -> 0.01, up to 1000 -> 0.05, up to 5000 -> 0.10,
/// up to 10000 -> 0.50, up to 20000 -> 1.00, above -> 5.00.
pub fn tick_size_for(price: Decimal) -> Decimal {
    if price < dec!(250) {
        dec!(0.01)
    } else if price <= dec!(1000) {
        dec!(0.05)
    } else if price <= dec!(5000) {
        dec!(0.10)
    } else if price <= dec!(10000) {
        dec!(0.50)
    } else if price <= dec!(20000) {
        dec!(1.00)
    } else {
        dec!(5.00)
    }
}
