mod commands;
mod config;
mod host;
mod plugin_manager;
mod sew_plugin;

use std::time::Duration;

use config::SewConfig;
use host::Host;
use sew_plugin::SewPlugin;
use tokio::io::AsyncBufReadExt;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = match SewConfig::load("sew.toml") {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load sew.toml: {e}");
            std::process::exit(1);
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Sew v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Ranks: {}", config.permissions.ranks_file);
    info!(
        "Claims: {} (max {} chunks per player)",
        config.claims.file, config.claims.max_chunks_per_player
    );
    info!("Event log: {}", config.event_log.database);

    let plugin = match SewPlugin::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to start Sew: {e}");
            std::process::exit(1);
        }
    };

    let mut host = Host::new();
    host.start(Box::new(plugin));

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    // Handle Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // Console REPL: read lines from stdin
    let (console_tx, mut console_rx) = tokio::sync::mpsc::channel::<String>(32);
    tokio::spawn(async move {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut tick_interval = tokio::time::interval(Duration::from_millis(50));
    loop {
        tokio::select! {
            _ = tick_interval.tick() => host.tick_blocking(),
            Some(line) = console_rx.recv() => {
                if line == "stop" {
                    break;
                }
                for reply in host.console_blocking(&line) {
                    info!("{reply}");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Saving before shutdown...");
    host.shutdown();
    info!("Sew shut down.");
}
