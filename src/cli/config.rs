//! CLI configuration structs bridging CLI arguments to engine types.
//!
//! These structs decouple the CLI parsing layer from the engine,
//! allowing command handlers to work with validated, typed
//! configurations.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::engine::StrategyConfig;
use crate::ladder::{ConvexParams, LinearParams, Schedule};

/// Errors from CLI configuration validation.
#[derive(Debug, Error)]
pub enum CliConfigError {
    #[error("unknown schedule: '{0}'. Use 'linear' or 'convex'")]
    UnknownSchedule(String),

    #[error("maintenance interval must be between 30 and 600 seconds, got {0}")]
    BadInterval(u64),

    #[error("at least one buy order is required")]
    NoOrders,
}

/// Ladder schedule selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Fixed 1% rungs with unit-increment sizing
    Linear,
    /// Power-law spacing and sizing
    Convex,
}

impl std::str::FromStr for ScheduleKind {
    type Err = CliConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "convex" => Ok(Self::Convex),
            _ => Err(CliConfigError::UnknownSchedule(s.to_string())),
        }
    }
}

/// Raw strategy options captured at the command layer before conversion
/// to the engine's [`StrategyConfig`].
#[derive(Debug, Clone)]
pub struct StrategyCliConfig {
    pub symbol: String,
    pub exchange: String,
    pub orders: u32,
    pub schedule: ScheduleKind,
    pub market_first: bool,
    pub interval_secs: u64,
    pub ledger_dir: PathBuf,
    /// Convex schedule knobs (ignored for linear).
    pub base_shares: u32,
    pub max_fall_pct: Decimal,
    pub fall_power: f64,
    pub size_power: f64,
    pub size_multiplier: f64,
}

impl StrategyCliConfig {
    /// Validate and convert to the engine configuration.
    pub fn into_strategy_config(self) -> Result<StrategyConfig, CliConfigError> {
        if self.orders == 0 {
            return Err(CliConfigError::NoOrders);
        }
        if !(30..=600).contains(&self.interval_secs) {
            return Err(CliConfigError::BadInterval(self.interval_secs));
        }

        let schedule = match self.schedule {
            ScheduleKind::Linear => Schedule::Linear(LinearParams {
                orders: self.orders,
                ..LinearParams::default()
            }),
            ScheduleKind::Convex => Schedule::Convex(ConvexParams {
                steps: self.orders,
                base_shares: self.base_shares,
                max_fall_pct: self.max_fall_pct,
                fall_power: self.fall_power,
                size_power: self.size_power,
                size_multiplier: self.size_multiplier,
                ..ConvexParams::default()
            }),
        };

        let mut config = StrategyConfig::for_symbol(self.symbol);
        config.exchange = self.exchange;
        config.target_active_buys = self.orders;
        config.schedule = schedule;
        config.market_first = self.market_first;
        config.maintenance_interval = Duration::from_secs(self.interval_secs);
        config.ledger_dir = self.ledger_dir;
        Ok(config)
    }
}
