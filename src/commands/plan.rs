//! The `plan` subcommand: print the ladder without placing anything.

use rust_decimal::Decimal;

use crate::broker::Broker;
use crate::cli::StrategyCliConfig;
use crate::ladder;
use crate::pricing;

/// Compute and print the ladder the `run` command would place. When no
/// price is given the live quote is used.
pub async fn run_plan(cli: StrategyCliConfig, price: Option<Decimal>) -> anyhow::Result<()> {
    let config = cli.into_strategy_config()?;

    let start_price = match price {
        Some(p) => p,
        None => {
            let broker = super::build_broker()?;
            broker.last_traded_price(&config.symbol).await?
        }
    };

    let tick_size = pricing::tick_size_for(start_price);
    let rungs = ladder::plan(start_price, tick_size, &config.schedule)?;

    println!(
        "Ladder plan for {} from {:.2} (tick size {}):",
        config.symbol, start_price, tick_size
    );
    println!(
        "{:>5} {:>9} {:>12} {:>12} {:>8}",
        "level", "drop %", "trigger", "limit", "shares"
    );
    let mut total_shares = 0u32;
    let mut total_value = Decimal::ZERO;
    for rung in &rungs {
        println!(
            "{:>5} {:>9} {:>12} {:>12} {:>8}",
            rung.level, rung.drop_pct, rung.trigger_price, rung.limit_price, rung.quantity
        );
        total_shares += rung.quantity;
        total_value += Decimal::from(rung.quantity) * rung.limit_price;
    }
    println!(
        "Full fill: {} shares for {:.2} (avg {:.2})",
        total_shares,
        total_value,
        if total_shares > 0 {
            total_value / Decimal::from(total_shares)
        } else {
            Decimal::ZERO
        }
    );

    Ok(())
}
