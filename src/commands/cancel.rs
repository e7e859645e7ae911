//! The `cancel` subcommand: tear down the symbol's ladder.

use std::io::Write;
use std::sync::Arc;

use tracing::info;

use crate::cli::StrategyCliConfig;
use crate::engine::AccumulationController;

/// Cancel every working order for the symbol and clear its ledger file.
/// Irreversible; prompts unless `assume_yes` is set.
pub async fn run_cancel(cli: StrategyCliConfig, assume_yes: bool) -> anyhow::Result<()> {
    let config = cli.into_strategy_config()?;
    let symbol = config.symbol.clone();

    if !assume_yes && !confirm(&symbol)? {
        println!("Cancellation aborted.");
        return Ok(());
    }

    let broker = Arc::new(super::build_broker()?);
    let controller = AccumulationController::new(broker, config);

    let cancelled = controller.cancel_all().await?;
    info!(symbol, cancelled, "cancellation finished");
    println!("Cancelled {cancelled} working orders for {symbol} and cleared the ledger.");
    Ok(())
}

fn confirm(symbol: &str) -> anyhow::Result<bool> {
    print!("Cancel ALL working orders for {symbol} and delete its ledger? This cannot be undone. (yes/no): ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}
