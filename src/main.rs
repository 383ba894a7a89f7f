//! Fleet Trader - coordinated multi-wallet trading
//!
//! # WARNING
//! - Every batch moves the price of the token it trades.
//! - Only simulation mode is wired up from the command line.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::error;

use fleet_trader::cli::commands;
use fleet_trader::config::Config;
use fleet_trader::dispatch::{DispatchOptions, TradeIntent};

/// Fleet Trader - coordinated multi-wallet trading
#[derive(Parser)]
#[command(name = "fleet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml", env = "FLEET_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

/// Execution switches shared by all trading commands
#[derive(Args, Clone, Copy)]
struct BatchArgs {
    /// Do not refresh wallet balances after the batch
    #[arg(long)]
    no_update: bool,

    /// Use the fixed send delay instead of random pacing
    #[arg(long)]
    fast: bool,
}

impl From<BatchArgs> for DispatchOptions {
    fn from(args: BatchArgs) -> Self {
        DispatchOptions {
            update_balances: !args.no_update,
            random_sleep: !args.fast,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show wallet balances, ranks and pool price
    Status,

    /// Show current configuration
    Config,

    /// Buy with the spendable balance of every wallet
    BuyAll {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Sell the whole token balance of every wallet
    SellAll {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Sell a percentage of the fleet's token supply
    SellPercent {
        /// Share of supply to sell, 0-100
        percent: f64,

        /// Mix in random opposite-direction orders
        #[arg(long)]
        noise: bool,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Spend an amount of base currency across the lightest holders
    BuyAmount {
        /// Base currency to spend
        amount: f64,

        /// Mix in random opposite-direction orders
        #[arg(long)]
        noise: bool,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Sell back part of the net buy volume in small chunks
    SlowSell {
        /// Net volume in tokens (default: monitored volume)
        #[arg(long)]
        volume: Option<f64>,

        /// Keep running rounds until Ctrl+C
        #[arg(long)]
        watch: bool,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Refresh all balances and write the statistics snapshot
    Statistics {
        /// Output file (default: dispatch.statistics_path)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleet_trader=info".parse()?),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Status => commands::status(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::BuyAll { batch } => {
            commands::trade(&config, TradeIntent::BuyAll, batch.into()).await
        }
        Commands::SellAll { batch } => {
            commands::trade(&config, TradeIntent::SellAll, batch.into()).await
        }
        Commands::SellPercent {
            percent,
            noise,
            batch,
        } => {
            commands::trade(
                &config,
                TradeIntent::SellPercent { percent, noise },
                batch.into(),
            )
            .await
        }
        Commands::BuyAmount {
            amount,
            noise,
            batch,
        } => {
            commands::trade(
                &config,
                TradeIntent::BuyAmount { amount, noise },
                batch.into(),
            )
            .await
        }
        Commands::SlowSell {
            volume,
            watch,
            batch,
        } => commands::slow_sell(&config, volume, watch, batch.into()).await,
        Commands::Statistics { output } => commands::statistics(&config, output).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
