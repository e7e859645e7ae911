//! CLI configuration structs bridging CLI arguments to engine types.

mod config;

pub use config::{CliConfigError, ScheduleKind, StrategyCliConfig};
