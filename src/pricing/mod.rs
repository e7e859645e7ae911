//! Pricing Math
//!
//! Tick-size rounding, trigger/limit price derivation, sell-side fee
//! schedule and the optimal-sell-price solver. Everything here is a pure
//! function of its inputs; no I/O, no broker state.

mod fees;
mod tick;

pub use fees::{
    fees_for_sell, optimal_sell_price, profit_with_fees, FeeBreakdown, ProfitAnalysis,
};
pub use tick::{
    round_to_tick, round_to_tick_or_paise, tick_size_for, trigger_and_limit, PricingError,
};
