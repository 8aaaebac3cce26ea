use clap::Parser;
use color_eyre::eyre::Result;
use metrics_aggregator::{http, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let state = cli.app_state()?;
    tracing::info!(
        target_url = %cli.target_url,
        address = %cli.metrics_bind_address,
        path = %cli.metrics_path,
        "starting server"
    );
    http::server(cli.metrics_bind_address, &cli.metrics_path, state).await
}
