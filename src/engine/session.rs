//! Per-symbol session state.
//!
//! Everything the tick handler needs to remember between callbacks lives
//! here, passed by reference into the handler — never in globals or
//! function-local statics.

use rust_decimal::Decimal;

/// Mutable session counters and last-seen prices for one symbol.
#[derive(Debug, Default)]
pub struct SymbolSession {
    /// Last traded price seen on the tick stream.
    pub last_price: Option<Decimal>,
    /// Ticks received.
    pub tick_count: u64,
    /// Ticks dropped because a maintenance cycle was already running.
    pub coalesced_ticks: u64,
    /// Maintenance cycles completed (tick- or timer-driven).
    pub cycle_count: u64,
    /// Consecutive timer cycles observed with the market closed.
    pub market_closed_cycles: u32,
    /// A sell order has already been parked for the next session while
    /// the market was closed; don't keep re-placing it.
    pub sell_parked_outside_market: bool,
}

impl SymbolSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an incoming tick and return the price.
    pub fn record_tick(&mut self, price: Decimal) -> Decimal {
        self.last_price = Some(price);
        self.tick_count += 1;
        price
    }

    pub fn record_coalesced_tick(&mut self) {
        self.coalesced_ticks += 1;
    }

    pub fn record_cycle(&mut self) {
        self.cycle_count += 1;
    }

    /// Track market-closed timer cycles; returns the consecutive count.
    pub fn record_market_closed_cycle(&mut self) -> u32 {
        self.market_closed_cycles += 1;
        self.market_closed_cycles
    }

    pub fn reset_market_closed_cycles(&mut self) {
        self.market_closed_cycles = 0;
        self.sell_parked_outside_market = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_recording() {
        let mut session = SymbolSession::new();
        assert_eq!(session.last_price, None);

        session.record_tick(dec!(101.5));
        session.record_tick(dec!(101.7));
        assert_eq!(session.last_price, Some(dec!(101.7)));
        assert_eq!(session.tick_count, 2);
    }

    #[test]
    fn test_market_closed_cycle_tracking() {
        let mut session = SymbolSession::new();
        assert_eq!(session.record_market_closed_cycle(), 1);
        assert_eq!(session.record_market_closed_cycle(), 2);

        session.sell_parked_outside_market = true;
        session.reset_market_closed_cycles();
        assert_eq!(session.market_closed_cycles, 0);
        assert!(!session.sell_parked_outside_market);
    }
}
