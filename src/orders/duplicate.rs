//! Near-duplicate order suppression.
//!
//! Re-running the planner after partial fills can produce rungs that sit
//! almost on top of orders already working at the broker. This check
//! rejects a candidate whose price or trigger lands within a relative
//! threshold of any active buy order.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::broker::BrokerOrder;
use crate::types::OrderSide;

/// Default similarity threshold: 1.2% relative distance.
pub const DEFAULT_SIMILARITY_THRESHOLD: Decimal = dec!(0.012);

/// Guard that compares candidate rungs against active buy orders.
#[derive(Debug, Clone)]
pub struct DuplicateGuard {
    threshold: Decimal,
}

impl Default for DuplicateGuard {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl DuplicateGuard {
    pub fn new(threshold: Decimal) -> Self {
        Self { threshold }
    }

    /// True when the candidate's limit or trigger price sits within the
    /// threshold of any existing ACTIVE buy order's corresponding price.
    pub fn is_similar(
        &self,
        new_price: Decimal,
        new_trigger_price: Decimal,
        existing: &[BrokerOrder],
    ) -> bool {
        for order in existing {
            if order.side != OrderSide::Buy || !order.status.is_open() {
                continue;
            }
            if order.price <= Decimal::ZERO {
                continue;
            }

            let price_diff = ((new_price - order.price) / order.price).abs();
            if price_diff <= self.threshold {
                debug!(
                    %new_price,
                    existing_price = %order.price,
                    diff_pct = %(price_diff * dec!(100)),
                    "candidate price too close to an active order"
                );
                return true;
            }

            if let Some(existing_trigger) = order.trigger_price {
                if existing_trigger > Decimal::ZERO {
                    let trigger_diff =
                        ((new_trigger_price - existing_trigger) / existing_trigger).abs();
                    if trigger_diff <= self.threshold {
                        debug!(
                            %new_trigger_price,
                            existing_trigger = %existing_trigger,
                            diff_pct = %(trigger_diff * dec!(100)),
                            "candidate trigger too close to an active order"
                        );
                        return true;
                    }
                }
            }
        }
        false
    }
}
