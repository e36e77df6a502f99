mod cli;
mod config;
mod error;
mod handlers;
mod intent;
mod providers;
mod response;
mod server;
mod template;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting releasebot {}", env!("CARGO_PKG_VERSION"));
    cli.execute().await?;

    Ok(())
}
