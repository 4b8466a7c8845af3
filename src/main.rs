use anyhow::Result;
use tokio::sync::broadcast;

use growatt_client::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    if options.attributes {
        print!("{}", growatt_client::growatt::registry()?.markdown_table());
        return Ok(());
    }

    let config = Config::new(options.config_file.clone())?;
    growatt_client::init_logging(&config.loglevel);
    info!("Read configuration from {}", options.config_file);
    config.log_summary();
    let config = ConfigWrapper::from_config(config);

    // Create a channel for shutdown signaling
    let (shutdown_tx, _) = broadcast::channel(1);

    // Handle Ctrl+C
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Shutdown signal received");
        if let Err(e) = shutdown_tx_clone.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    });

    growatt_client::app(options, config, shutdown_tx).await
}
