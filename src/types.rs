//! Common Types Module
//!
//! Shared types used across the codebase to avoid circular dependencies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Represents a market data update (price tick) for the traded instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketTick {
    /// The trading symbol (e.g., "ITC").
    pub symbol: String,
    /// Last traded price.
    pub last_price: Decimal,
    /// The timestamp of the update (unix millis).
    pub timestamp: i64,
}
