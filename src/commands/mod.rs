//! CLI command handlers.
//!
//! Each subcommand delegates here; handlers own broker construction and
//! wire the engine pieces together.

mod cancel;
mod plan;
mod run;

pub use cancel::run_cancel;
pub use plan::run_plan;
pub use run::run_strategy;

use crate::broker::{BrokerError, KiteBroker, KiteConfig, ResilientBroker, RetryPolicy};

/// Build the production broker stack: Kite REST client wrapped with
/// timeouts and capped retries.
pub(crate) fn build_broker() -> Result<ResilientBroker<KiteBroker>, BrokerError> {
    let config = KiteConfig::from_env()?;
    let kite = KiteBroker::new(config)?;
    Ok(ResilientBroker::new(kite, RetryPolicy::default()))
}
