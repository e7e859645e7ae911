//! Property-based tests for the pricing math and ladder schedules.
//!
//! These verify invariants across many random inputs, catching edge
//! cases the unit tests miss.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use gttladder::ladder::{self, ConvexParams, Schedule};
use gttladder::pricing;

proptest! {
    /// Rounding to tick is idempotent: rounding a rounded price is a
    /// no-op for every positive price and tick.
    #[test]
    fn round_to_tick_is_idempotent(
        price_paise in 1i64..10_000_000i64,
        tick in prop::sample::select(vec![
            dec!(0.01), dec!(0.05), dec!(0.10), dec!(0.50), dec!(1.00), dec!(5.00),
        ])
    ) {
        let price = Decimal::new(price_paise, 2);
        let once = pricing::round_to_tick(price, tick).unwrap();
        let twice = pricing::round_to_tick(once, tick).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// The rounded price never moves more than half a tick.
    #[test]
    fn round_to_tick_stays_within_half_tick(
        price_paise in 1i64..10_000_000i64,
        tick in prop::sample::select(vec![
            dec!(0.01), dec!(0.05), dec!(0.10), dec!(0.50), dec!(1.00),
        ])
    ) {
        let price = Decimal::new(price_paise, 2);
        let rounded = pricing::round_to_tick(price, tick).unwrap();
        let half_tick = tick / dec!(2);
        prop_assert!((rounded - price).abs() <= half_tick);
    }

    /// Net profit is monotonically non-decreasing in the sell price.
    #[test]
    fn net_profit_monotonic_in_sell_price(
        buy_paise in 5_000i64..500_000i64,
        qty in 1u32..1000u32,
        bump_paise in 1i64..10_000i64,
    ) {
        let buy = Decimal::new(buy_paise, 2);
        let sell = buy + dec!(1);
        let higher = sell + Decimal::new(bump_paise, 2);

        let low = pricing::profit_with_fees(buy, sell, qty);
        let high = pricing::profit_with_fees(buy, higher, qty);
        prop_assert!(high.net_profit_pct >= low.net_profit_pct);
    }

    /// For lots where the fixed depository charge is small relative to
    /// the buy value, the solver lands within one 0.1% step of the
    /// requested net profit.
    #[test]
    fn solver_reaches_target_for_meaningful_lots(
        buy_paise in 10_000i64..200_000i64,
        qty in 10u32..500u32,
        target_tenths in 10i64..100i64,
    ) {
        let buy = Decimal::new(buy_paise, 2);
        let target = Decimal::new(target_tenths, 1); // 1.0% .. 10.0%
        // Keep the fixed charge below ~1.6% of buy value so the walk
        // stays inside the iteration cap.
        prop_assume!(buy * Decimal::from(qty) >= dec!(1000));

        let price = pricing::optimal_sell_price(buy, qty, target);
        prop_assert!(price > buy);

        let net = pricing::profit_with_fees(buy, price, qty).net_profit_pct;
        // One 0.1% price step moves net profit by roughly
        // 0.1 * (sell/buy) percentage points; bound with headroom.
        prop_assert!(
            (net - target).abs() <= dec!(0.15),
            "buy {} qty {} target {} -> sell {} nets {}",
            buy, qty, target, price, net
        );
    }

    /// Convex plans are monotone: drops and sizes never decrease with
    /// the level, and the first rung holds the base size.
    #[test]
    fn convex_plan_is_monotone(
        start_paise in 2_500_000i64..50_000_000i64,
        steps in 2u32..20u32,
        fall_power in 1.0f64..3.0f64,
        size_power in 1.0f64..3.0f64,
    ) {
        let start = Decimal::new(start_paise, 4); // 250.0000 .. 5000.0000
        let params = ConvexParams {
            steps,
            fall_power,
            size_power,
            ..ConvexParams::default()
        };
        let tick = pricing::tick_size_for(start);
        let rungs = ladder::plan(start, tick, &Schedule::Convex(params.clone())).unwrap();

        prop_assert_eq!(rungs.len(), steps as usize);
        prop_assert!(rungs[0].quantity >= params.base_shares);
        for pair in rungs.windows(2) {
            prop_assert!(pair[1].drop_pct >= pair[0].drop_pct);
            prop_assert!(pair[1].quantity >= pair[0].quantity);
            prop_assert!(pair[1].trigger_price <= pair[0].trigger_price);
        }
    }
}
