//! Ladder Planner
//!
//! Turns a start price and strategy parameters into an ordered sequence
//! of planned buy rungs. Two interchangeable schedules are supported:
//! a linear chain of fixed percentage drops with unit-increment sizing,
//! and a convex (power-law) plan that back-loads both price spacing and
//! share size. Planners never touch the ledger or the broker.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::pricing::{self, PricingError};
use crate::types::OrderSide;

/// A single planned rung of the buy ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    /// Zero-based rung index.
    pub level: u32,
    /// Cumulative percentage drop from the start price (convex) or the
    /// per-rung drop applied to the previous rung (linear).
    pub drop_pct: Decimal,
    /// Price at which the conditional order arms.
    pub trigger_price: Decimal,
    /// Limit price submitted once triggered.
    pub limit_price: Decimal,
    /// Shares to buy at this rung.
    pub quantity: u32,
}

/// Parameters for the linear chained-drop schedule.
#[derive(Debug, Clone)]
pub struct LinearParams {
    /// Number of rungs to plan.
    pub orders: u32,
    /// Drop applied to the first rung. The exchange rejects triggers
    /// closer than 0.25% to the last traded price, hence the 0.27 default.
    pub first_drop_pct: Decimal,
    /// Drop applied to each subsequent rung, chained off the previous
    /// rung's limit price.
    pub step_pct: Decimal,
    /// Ticks between trigger and limit price.
    pub delta_ticks: u32,
    /// Quantity offset: rung i gets `start_quantity + i` shares.
    pub start_quantity: u32,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            orders: 5,
            first_drop_pct: dec!(0.27),
            step_pct: dec!(1.0),
            delta_ticks: 2,
            start_quantity: 1,
        }
    }
}

/// Parameters for the convex accumulation schedule.
#[derive(Debug, Clone)]
pub struct ConvexParams {
    /// Number of planned buys, including the first.
    pub steps: u32,
    /// Shares bought at the initial entry.
    pub base_shares: u32,
    /// Maximum cumulative fall to plan for.
    pub max_fall_pct: Decimal,
    /// Convexity of price spacing (>1 back-loads the rungs).
    pub fall_power: f64,
    /// Convexity of share sizing (>1 back-loads the size growth).
    pub size_power: f64,
    /// Scales the aggressiveness of size growth.
    pub size_multiplier: f64,
    /// Ticks between trigger and limit price.
    pub delta_ticks: u32,
}

impl Default for ConvexParams {
    fn default() -> Self {
        Self {
            steps: 10,
            base_shares: 15,
            max_fall_pct: dec!(10.0),
            fall_power: 1.7,
            size_power: 1.6,
            size_multiplier: 3.8,
            delta_ticks: 2,
        }
    }
}

/// Which schedule the planner runs.
#[derive(Debug, Clone)]
pub enum Schedule {
    Linear(LinearParams),
    Convex(ConvexParams),
}

impl Schedule {
    /// Number of rungs this schedule plans.
    pub fn planned_orders(&self) -> u32 {
        match self {
            Schedule::Linear(p) => p.orders,
            Schedule::Convex(p) => p.steps,
        }
    }
}

/// Plan a full ladder from `start_price` using the given schedule and
/// tick size.
pub fn plan(
    start_price: Decimal,
    tick_size: Decimal,
    schedule: &Schedule,
) -> Result<Vec<PlannedOrder>, PricingError> {
    match schedule {
        Schedule::Linear(params) => plan_linear(start_price, tick_size, params),
        Schedule::Convex(params) => plan_convex(start_price, tick_size, params),
    }
}

/// Linear schedule: rung 0 drops `first_drop_pct` from the start price,
/// each later rung drops `step_pct` from the previous rung's limit
/// price. Rung i buys `start_quantity + i` shares.
fn plan_linear(
    start_price: Decimal,
    tick_size: Decimal,
    params: &LinearParams,
) -> Result<Vec<PlannedOrder>, PricingError> {
    let mut rungs = Vec::with_capacity(params.orders as usize);
    let mut base = start_price;

    for level in 0..params.orders {
        let drop_pct = if level == 0 {
            params.first_drop_pct
        } else {
            params.step_pct
        };
        let (trigger_price, limit_price) =
            pricing::trigger_and_limit(base, drop_pct, tick_size, OrderSide::Buy, params.delta_ticks)?;

        rungs.push(PlannedOrder {
            level,
            drop_pct,
            trigger_price,
            limit_price,
            quantity: params.start_quantity + level,
        });
        base = limit_price;
    }

    Ok(rungs)
}

/// Convex schedule: for normalized position t in [0, 1] the cumulative
/// fall is `max_fall_pct * t^fall_power` and the size is
/// `base_shares * (1 + size_multiplier * t^size_power)`, floored at
/// `base_shares`. The power curves run through f64 (`Decimal` has no
/// fractional exponentiation) and the resulting percentages are
/// re-quantized before any price math.
fn plan_convex(
    start_price: Decimal,
    tick_size: Decimal,
    params: &ConvexParams,
) -> Result<Vec<PlannedOrder>, PricingError> {
    let mut rungs = Vec::with_capacity(params.steps as usize);

    for level in 0..params.steps {
        let t = if params.steps > 1 {
            f64::from(level) / f64::from(params.steps - 1)
        } else {
            0.0
        };

        let max_fall = params.max_fall_pct.to_f64().unwrap_or(0.0);
        let fall_pct = max_fall * t.powf(params.fall_power);
        let drop_pct = Decimal::from_f64(fall_pct)
            .unwrap_or(Decimal::ZERO)
            .round_dp(2);

        let (trigger_price, limit_price) = pricing::trigger_and_limit(
            start_price,
            drop_pct,
            tick_size,
            OrderSide::Buy,
            params.delta_ticks,
        )?;

        let raw_shares =
            f64::from(params.base_shares) * (1.0 + params.size_multiplier * t.powf(params.size_power));
        let quantity = (raw_shares.round() as u32).max(params.base_shares);

        rungs.push(PlannedOrder {
            level,
            drop_pct,
            trigger_price,
            limit_price,
            quantity,
        });
    }

    Ok(rungs)
}

/// Continuation rung used by maintenance when the ladder has been eaten
/// into: trigger 1% below `base_price` (the lowest currently active buy
/// or the previous continuation rung) and limit a further 1% below the
/// trigger. The doubled discount keeps consecutive replacements about
/// 2% apart, clear of the 1.2% duplicate guard.
pub fn continuation_rung(
    base_price: Decimal,
    tick_size: Decimal,
    quantity: u32,
) -> Result<PlannedOrder, PricingError> {
    let step = dec!(1.0);
    let factor = Decimal::ONE - step / dec!(100);
    let trigger_price = pricing::round_to_tick(base_price * factor, tick_size)?;
    let limit_price = pricing::round_to_tick(trigger_price * factor, tick_size)?;
    Ok(PlannedOrder {
        level: 0,
        drop_pct: step,
        trigger_price,
        limit_price,
        quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_plan_chains_one_percent_drops() {
        let params = LinearParams {
            orders: 5,
            first_drop_pct: dec!(1.0),
            step_pct: dec!(1.0),
            delta_ticks: 2,
            start_quantity: 1,
        };
        let rungs = plan_linear(dec!(100), dec!(0.05), &params).unwrap();

        let triggers: Vec<Decimal> = rungs.iter().map(|r| r.trigger_price).collect();
        assert_eq!(
            triggers,
            vec![dec!(99.00), dec!(98.10), dec!(97.20), dec!(96.35), dec!(95.50)]
        );
        let limits: Vec<Decimal> = rungs.iter().map(|r| r.limit_price).collect();
        assert_eq!(
            limits,
            vec![dec!(99.10), dec!(98.20), dec!(97.30), dec!(96.45), dec!(95.60)]
        );
        let quantities: Vec<u32> = rungs.iter().map(|r| r.quantity).collect();
        assert_eq!(quantities, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_linear_first_rung_uses_minimum_distance() {
        let rungs = plan_linear(dec!(100), dec!(0.05), &LinearParams::default()).unwrap();
        // 0.27% below 100 -> 99.73 -> 99.75 on a 0.05 tick
        assert_eq!(rungs[0].trigger_price, dec!(99.75));
        assert_eq!(rungs[0].limit_price, dec!(99.85));
    }

    #[test]
    fn test_convex_plan_monotonic() {
        let rungs = plan_convex(dec!(450.50), dec!(0.05), &ConvexParams::default()).unwrap();
        assert_eq!(rungs.len(), 10);
        assert_eq!(rungs[0].drop_pct, Decimal::ZERO);
        assert_eq!(rungs[0].quantity, 15);

        for pair in rungs.windows(2) {
            assert!(pair[1].drop_pct >= pair[0].drop_pct);
            assert!(pair[1].quantity >= pair[0].quantity);
            assert!(pair[1].trigger_price <= pair[0].trigger_price);
        }

        // Last rung carries the full planned fall and the largest size
        assert_eq!(rungs[9].drop_pct, dec!(10.00));
        assert_eq!(rungs[9].quantity, 72); // 15 * (1 + 3.8) = 72
    }

    #[test]
    fn test_convex_single_step_plan() {
        let params = ConvexParams {
            steps: 1,
            ..ConvexParams::default()
        };
        let rungs = plan_convex(dec!(100), dec!(0.05), &params).unwrap();
        assert_eq!(rungs.len(), 1);
        assert_eq!(rungs[0].drop_pct, Decimal::ZERO);
        assert_eq!(rungs[0].quantity, 15);
    }

    #[test]
    fn test_continuation_rung() {
        let rung = continuation_rung(dec!(95.60), dec!(0.05), 6).unwrap();
        // Trigger 1% below 95.60 -> 94.644 -> 94.65; limit another 1%
        // below the trigger -> 93.7035 -> 93.70
        assert_eq!(rung.trigger_price, dec!(94.65));
        assert_eq!(rung.limit_price, dec!(93.70));
        assert_eq!(rung.quantity, 6);
    }
}
