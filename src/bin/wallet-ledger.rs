use anyhow::{Context, Result};
use clap::Parser;
use wallet_ledger::{
    config::{Cli, ServiceConfig},
    logging::{self, DEFAULT_FILTER},
    service::Service,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(DEFAULT_FILTER, cli.log_format, cli.log_file.as_deref())?;

    let config = ServiceConfig::try_from(cli).context("Invalid configuration")?;
    let service = Service::open(config).await?;
    service.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
