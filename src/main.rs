use clap::Parser;
use dotenv::dotenv;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gttladder::cli::{ScheduleKind, StrategyCliConfig};
use gttladder::commands;

#[derive(Parser)]
#[command(author, version, about = "Fall-and-accumulate GTT ladder trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set the verbosity level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    verbose: String,
}

#[derive(clap::Args, Clone)]
struct StrategyArgs {
    /// Trading symbol (e.g., "ITC")
    #[arg(short, long)]
    symbol: String,

    /// Exchange name
    #[arg(long, default_value = "NSE")]
    exchange: String,

    /// Number of active buy orders to keep on the ladder
    #[arg(short, long, default_value_t = 5)]
    orders: u32,

    /// Ladder schedule: linear or convex
    #[arg(long, default_value = "linear")]
    schedule: String,

    /// Place the first rung as a market order when the session is open
    #[arg(long, default_value_t = false)]
    market_first: bool,

    /// Seconds between timer-driven maintenance cycles
    #[arg(long, default_value_t = 90)]
    interval: u64,

    /// Directory for ledger files
    #[arg(long, default_value = "workdir/orders")]
    ledger_dir: PathBuf,

    /// Convex schedule: shares at the first rung
    #[arg(long, default_value_t = 15)]
    base_shares: u32,

    /// Convex schedule: maximum cumulative fall to plan for (percent)
    #[arg(long, default_value = "10.0")]
    max_fall_pct: Decimal,

    /// Convex schedule: price spacing convexity (>1 = back-loaded)
    #[arg(long, default_value_t = 1.7)]
    fall_power: f64,

    /// Convex schedule: share sizing convexity (>1 = back-loaded)
    #[arg(long, default_value_t = 1.6)]
    size_power: f64,

    /// Convex schedule: size growth multiplier
    #[arg(long, default_value_t = 3.8)]
    size_multiplier: f64,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Place (or adopt) the buy ladder and maintain it
    Run {
        #[command(flatten)]
        strategy: StrategyArgs,
    },
    /// Print the planned ladder without placing orders
    Plan {
        #[command(flatten)]
        strategy: StrategyArgs,
        /// Plan from this price instead of the live quote
        #[arg(long)]
        price: Option<Decimal>,
    },
    /// Cancel all working orders for the symbol and clear its ledger
    Cancel {
        #[command(flatten)]
        strategy: StrategyArgs,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

fn cli_config(args: &StrategyArgs) -> anyhow::Result<StrategyCliConfig> {
    Ok(StrategyCliConfig {
        symbol: args.symbol.clone(),
        exchange: args.exchange.clone(),
        orders: args.orders,
        schedule: args.schedule.parse::<ScheduleKind>()?,
        market_first: args.market_first,
        interval_secs: args.interval,
        ledger_dir: args.ledger_dir.clone(),
        base_shares: args.base_shares,
        max_fall_pct: args.max_fall_pct,
        fall_power: args.fall_power,
        size_power: args.size_power,
        size_multiplier: args.size_multiplier,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.verbose.clone())),
        )
        .init();

    match &cli.command {
        Commands::Run { strategy } => {
            commands::run_strategy(cli_config(strategy)?).await?;
        }
        Commands::Plan { strategy, price } => {
            commands::run_plan(cli_config(strategy)?, *price).await?;
        }
        Commands::Cancel { strategy, yes } => {
            commands::run_cancel(cli_config(strategy)?, *yes).await?;
        }
    }

    Ok(())
}
