//! AlgoTix command line.

use algotix_deployer::{Config, DeployOptions, TicketService};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "algotix")]
#[command(about = "Deploy the AlgoTix ticket application and verify ticket ownership", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ALGOTIX_CONFIG")]
    config: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the application and asset, link them, and persist the record
    Deploy {
        /// Resume with an already-created application
        #[arg(long)]
        app_id: Option<u64>,

        /// Resume with an already-minted asset (requires --app-id)
        #[arg(long, requires = "app_id")]
        asset_id: Option<u64>,
    },

    /// Check whether an account holds the credential asset
    Check { address: String },

    /// Node connectivity and current identifiers
    Status,

    /// Opt the deployer account into the credential asset
    OptIn {
        #[arg(long)]
        asset_id: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, cancelling...");
            cancel_on_signal.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> algotix_deployer::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    info!(node = %config.node_url(), record = %config.record_path, "Configuration loaded");

    let service = TicketService::from_config(config, cancel).await?;

    match cli.command {
        Commands::Deploy { app_id, asset_id } => {
            let record = service
                .deploy(DeployOptions {
                    existing_app_id: app_id,
                    existing_asset_id: asset_id,
                })
                .await?;
            print_json(&record)
        }
        Commands::Check { address } => print_json(&service.check(&address).await?),
        Commands::Status => print_json(&service.status().await),
        Commands::OptIn { asset_id } => {
            let tx_id = service.opt_in(asset_id).await?;
            print_json(&serde_json::json!({ "tx_id": tx_id }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> algotix_deployer::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        algotix_deployer::Error::InvalidConfiguration(format!("unprintable output: {e}"))
    })?;
    println!("{text}");
    Ok(())
}
