use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shipwright::config::ServiceConfig;
use shipwright::server::{ServerConfig, start_server};

#[derive(Parser)]
#[command(name = "shipwright")]
#[command(version, about = "Webhook-driven LLM app builder and Pages deployer")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook server
    Serve {
        #[arg(long, default_value_t = 8000)]
        port: u16,

        /// Path to the SQLite deployment store
        #[arg(long, default_value = "data/deployments.db")]
        db: PathBuf,

        /// Bind on all interfaces and allow cross-origin requests
        #[arg(long)]
        dev: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve { port, db, dev } => {
            let server_config = ServerConfig {
                port,
                db_path: db,
                dev_mode: dev,
            };
            start_server(server_config, ServiceConfig::from_env()).await
        }
    }
}
