//! Accumulation Engine
//!
//! The controller state machine that keeps the buy ladder full and the
//! sell order correct, the runner that drives it from ticks and a timer,
//! and the per-symbol session state.

mod controller;
mod runner;
mod session;

pub use controller::{
    AccumulationController, MaintenanceOutcome, MaintenanceTrigger, PlacementSummary, SellAction,
};
pub use runner::EngineRunner;
pub use session::SymbolSession;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use thiserror::Error;

use crate::broker::BrokerError;
use crate::ladder::Schedule;
use crate::orders::LedgerError;

/// Errors surfaced by the engine loops.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// No usable market price to plan from.
    #[error("no market price available for {0}")]
    NoMarketPrice(String),
}

impl EngineError {
    /// Session expiry must reach the supervisor; everything else is
    /// handled (retried, skipped or logged) inside the loops.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Broker(BrokerError::SessionExpired))
    }
}

/// Strategy parameters for one symbol.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub symbol: String,
    pub exchange: String,
    /// Number of buy orders to keep active.
    pub target_active_buys: u32,
    /// Ladder schedule for the initial placement pass.
    pub schedule: Schedule,
    /// Place the first rung as a market order when the session is open.
    pub market_first: bool,
    /// Net profit target while holdings are small.
    pub small_lot_profit_pct: Decimal,
    /// Share count at or below which the small-lot target applies.
    pub small_lot_threshold: u32,
    /// Net profit target for larger holdings.
    pub standard_profit_pct: Decimal,
    /// Sell trigger sits this far below the sell limit.
    pub sell_trigger_drop_pct: Decimal,
    /// Ticks between a sell trigger and its limit price.
    pub sell_delta_ticks: u32,
    /// Gate sell parking and market-first placement on the exchange
    /// session window. Off in tests, where there is no real clock.
    pub enforce_market_hours: bool,
    /// Timer-driven maintenance interval.
    pub maintenance_interval: Duration,
    /// Stop after this many consecutive market-closed timer cycles.
    pub max_market_closed_cycles: u32,
    /// Ledger directory.
    pub ledger_dir: std::path::PathBuf,
}

impl StrategyConfig {
    /// Defaults for an NSE symbol: 5-rung linear ladder, 3%/2% profit
    /// targets split at 3 shares, 90s maintenance timer.
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            exchange: "NSE".to_string(),
            target_active_buys: 5,
            schedule: Schedule::Linear(crate::ladder::LinearParams::default()),
            market_first: false,
            small_lot_profit_pct: dec!(3.0),
            small_lot_threshold: 3,
            standard_profit_pct: dec!(2.0),
            sell_trigger_drop_pct: dec!(1.2),
            sell_delta_ticks: 1,
            enforce_market_hours: true,
            maintenance_interval: Duration::from_secs(90),
            max_market_closed_cycles: 40,
            ledger_dir: std::path::PathBuf::from("workdir/orders"),
        }
    }

    /// Profit target for the current holdings size.
    pub fn profit_target_for(&self, total_shares: u32) -> Decimal {
        if total_shares <= self.small_lot_threshold {
            self.small_lot_profit_pct
        } else {
            self.standard_profit_pct
        }
    }
}
