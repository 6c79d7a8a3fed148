//! Pool Watch - new-pool candidate detector with paper trading
//!
//! Nothing here signs or sends transactions. Accepted candidates are only
//! simulated against a synthetic price feed.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use pool_watch::cli::commands;
use pool_watch::config::{Config, SourceKind};

/// Pool Watch - new-pool candidate detector
#[derive(Parser)]
#[command(name = "pool-watch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "pool-watch.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the pipeline
    Run {
        /// Override the configured source (ledger | synthetic)
        #[arg(long)]
        source: Option<SourceKind>,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Evaluate a single mint through the filter
    Check {
        /// Token mint address
        mint: String,

        /// Pretend the token was created this many seconds ago
        #[arg(long, default_value = "600")]
        age_sec: u64,
    },
}

fn init_tracing(json: bool) {
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pool_watch={}", default_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { source } => commands::run(&config, source).await,
        Commands::Config => commands::show_config(&config),
        Commands::Check { mint, age_sec } => commands::check(&config, &mint, age_sec).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
