//! SDM630 energy meter bridge.
//!
//! Polls SDM630 meters over Modbus RTU twice a minute and publishes the
//! readings to MQTT.

use anyhow::{Context, Result};
use clap::Parser;
use sdm630_bridge::broker::MqttConnector;
use sdm630_bridge::bus::RtuConnector;
use sdm630_bridge::config::BridgeConfig;
use sdm630_bridge::cycle::PollCycle;
use sdm630_bridge::publisher::Publisher;
use sdm630_bridge::scheduler::{Schedule, Scheduler};
use sdm630_common::LoggingConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// SDM630 Modbus RTU to MQTT bridge.
#[derive(Parser, Debug)]
#[command(name = "sdm630-bridge")]
#[command(about = "Polls SDM630 energy meters and publishes to MQTT")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "sdm630.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = BridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    sdm630_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Start!");
    info!("Loaded configuration from {:?}", args.config);

    let registers = Arc::new(config.meter.register_map()?);
    let schedule = Schedule::new(config.schedule.seconds.iter().copied())?;

    info!(
        devices = ?config.meter.devices,
        registers = registers.len(),
        port = %config.meter.connection.port,
        broker = %config.mqtt.host,
        "Meter bridge configured"
    );

    let cycle = PollCycle::new(
        RtuConnector::new(config.meter.connection.clone(), config.meter.timeout()),
        MqttConnector::new(config.mqtt.clone()),
        config.meter.devices.clone(),
        registers,
        Publisher::new(config.meter.topic_prefix.clone(), config.meter.payload),
    );
    let scheduler = Scheduler::new(schedule, config.schedule.misfire_grace(), cycle);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            // Keep the sender alive so the scheduler keeps running.
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    scheduler.run(shutdown_rx).await;

    info!("Finished!");
    Ok(())
}
