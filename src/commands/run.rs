//! The `run` subcommand: initial placement plus the maintenance loop.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use crate::cli::StrategyCliConfig;
use crate::engine::{AccumulationController, EngineRunner};

/// Place (or adopt) the ladder, then maintain it until Ctrl-C, session
/// expiry or a prolonged market close.
pub async fn run_strategy(cli: StrategyCliConfig) -> anyhow::Result<()> {
    let config = cli.into_strategy_config()?;
    let symbol = config.symbol.clone();

    let broker = Arc::new(super::build_broker()?);
    let controller = Arc::new(AccumulationController::new(broker, config));

    let summary = controller.initial_placement().await?;
    if summary.adopted_existing {
        info!(symbol, "existing ladder adopted, entering maintenance");
    } else {
        info!(
            symbol,
            placed = summary.placed,
            planned = summary.planned,
            skipped = summary.skipped_similar,
            "initial ladder placed, entering maintenance"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Tick feed integration point: a market-data adapter pushes
    // `MarketTick`s into this channel. Without one attached the timer
    // alone drives maintenance.
    let (_tick_tx, tick_rx) = mpsc::channel(256);

    let runner = EngineRunner::new(controller, shutdown_rx);
    let mut loop_handle = tokio::spawn(runner.run(tick_rx));

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(symbol, "interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
            // Let the loop observe the signal and flush the ledger.
            loop_handle.await
        }
        result = &mut loop_handle => result,
    };

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(symbol, error = %e, "maintenance loop stopped with error");
            Err(e.into())
        }
        Err(join_err) => Err(join_err.into()),
    }
}
