// src/main.rs

//! A small monitor that opens a datasource from a settings file and logs every
//! status report until interrupted.

use anyhow::{Context, Result};
use spineldb_datasource::{Datasource, Settings};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("spineldb-datasource version {VERSION}");
        return Ok(());
    }

    // The settings path can be given with --config; otherwise "datasource.toml" is used.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("datasource.toml");

    let settings = match Settings::from_file(config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    let default_level = if settings.is_debugging() {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_ansi(true)
        .init();

    info!(
        "Opening datasource {} (enabled: {}, keepalive: {}).",
        settings.redacted_url(),
        settings.is_enabled(),
        settings.is_keepalive_enabled()
    );

    let datasource = Datasource::open(settings).await;
    let initial = datasource.wrap();
    if initial.is_success() {
        info!("{}", initial);
    } else {
        warn!("{}", initial);
    }

    datasource.set_notifier(|report| {
        info!(target: "spineldb_datasource::report", "{}", report.to_json());
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;

    info!("Shutdown signal received.");
    datasource.close().await;
    Ok(())
}
