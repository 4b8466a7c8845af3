// Module declarations for the library's components
pub mod client;         // Inverter facade: identity, polling, snapshots
pub mod config;         // Configuration management
pub mod decode;         // Register word decoding
pub mod error;          // Error handling and types
pub mod formula;        // Derived attribute formulas
pub mod growatt;        // Built-in Growatt register table and identity block
pub mod options;        // Command line options parsing
pub mod prelude;        // Common imports and types
pub mod register;       // Attribute definitions and the registry
pub mod register_group; // Coalescing attributes into read requests
pub mod transport;      // Modbus RTU transport

// Get the package version from Cargo.toml
pub const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::client::{GrowattClient, Snapshot};
use crate::prelude::*;
use crate::transport::Transport;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

/// Set up env_logger with `level` as the default filter. `RUST_LOG` still wins.
pub fn init_logging(level: &str) {
    if let Err(e) = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init()
    {
        eprintln!("Failed to initialise logging: {}", e);
    }
}

/// Poll every enabled inverter until shutdown is signalled.
///
/// Each serial port gets its own task, which polls the inverters on that port
/// one after the other. A failed poll is logged and retried on the next tick.
pub async fn app(
    options: Options,
    config: ConfigWrapper,
    shutdown_tx: broadcast::Sender<()>,
) -> anyhow::Result<()> {
    info!("growatt-client {} starting", CARGO_PKG_VERSION);

    if let Some(seconds) = options.runtime {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            info!("Runtime limit of {}s reached", seconds);
            if let Err(e) = shutdown_tx.send(()) {
                error!("Failed to send shutdown signal: {}", e);
            }
        });
    }

    let interval = config.poll_interval();
    let mut handles = Vec::new();
    for (port, inverters) in config.inverters_by_port() {
        let mut clients = Vec::with_capacity(inverters.len());
        for inverter in &inverters {
            let registry = Arc::new(inverter.registry()?);
            clients.push(GrowattClient::open(
                inverter.port(),
                inverter.address(),
                inverter.baud_rate(),
                inverter.read_timeout(),
                registry,
            ));
        }

        info!("{}: polling {} inverter(s) every {:?}", port, clients.len(), interval);
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(poll_port(
            port,
            clients,
            interval,
            options.once,
            shutdown_rx,
        )));
    }

    if handles.is_empty() {
        warn!("No enabled inverters configured");
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Error waiting for port task: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Poll `clients` in turn every `interval` until shutdown, or after one round
/// when `once` is set. Every client is closed before the clients are handed
/// back.
pub async fn poll_port<T: Transport>(
    port: String,
    mut clients: Vec<GrowattClient<T>>,
    interval: Duration,
    once: bool,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Vec<GrowattClient<T>> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'polling: loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.recv() => break,
        }

        for client in clients.iter_mut() {
            // the poll future must be gone before the client is touched again
            let outcome = tokio::select! {
                result = client.poll() => Some(result),
                _ = shutdown_rx.recv() => None,
            };

            match outcome {
                Some(Ok(snapshot)) => report(client, &snapshot),
                Some(Err(e)) => error!("{} unit {}: poll failed: {}", port, client.address(), e),
                None => break 'polling,
            }
        }

        if once {
            break;
        }
    }

    for client in clients.iter_mut() {
        client.close().await;
    }
    info!("{}: polling stopped", port);
    clients
}

fn report<T: Transport>(client: &GrowattClient<T>, snapshot: &Snapshot) {
    for attribute in client.attributes() {
        if let Some(value) = snapshot.get(attribute.name()) {
            info!(
                "unit {}: {} {} {}",
                client.address(),
                attribute.description(),
                value,
                attribute.unit()
            );
        }
    }

    match serde_json::to_string(snapshot) {
        Ok(json) => debug!("unit {}: {}", client.address(), json),
        Err(e) => warn!("Failed to serialise snapshot: {}", e),
    }
}
