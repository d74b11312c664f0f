//! # feedline
//!
//! Command-line front end for the Feedline client core. Each invocation
//! opens the configured backend, signs in when credentials are given, runs
//! one command and exits (except `watch`).

mod cli;
mod commands;

use clap::Parser;
use feedline_client::FeedClient;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,feedline_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.client_config();
    info!(backend = ?config.backend, "starting feedline v{}", env!("CARGO_PKG_VERSION"));

    let client = FeedClient::open(&config)?;
    commands::run(&client, &cli).await?;
    client.shutdown().await;
    Ok(())
}
