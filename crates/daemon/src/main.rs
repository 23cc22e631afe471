//! Multivisor - Main Entry Point
//! Polls every configured supervisord and serves the aggregate over JSON-RPC

mod args;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use multivisor_api_rpc::{RpcServer, RpcServerConfig};
use multivisor_core::application::constants::{
    DEFAULT_BUS_CAPACITY, DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
};
use multivisor_core::application::{EventBus, Multivisor, Poller, SubscriberBroker};
use multivisor_core::port::time_provider::SystemTimeProvider;
use multivisor_infra_config::IniConfigSource;
use multivisor_infra_xmlrpc::XmlRpcConnector;

use crate::args::Args;

fn init_logging(args: &Args) {
    let log_format =
        std::env::var("MULTIVISOR_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.directive()));

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Logging
    init_logging(&args);
    info!("Multivisor v{} starting...", multivisor_core::VERSION);

    // 2. Event plumbing
    let bus = EventBus::new(DEFAULT_BUS_CAPACITY, Arc::new(SystemTimeProvider));
    let (broker, broker_handle) = SubscriberBroker::spawn(&bus, DEFAULT_SUBSCRIBER_QUEUE_CAPACITY);

    // 3. Configuration and supervisor table
    info!(config = %args.config, "Loading configuration...");
    let config_source = Arc::new(IniConfigSource::new(&args.config));
    let multivisor = Arc::new(
        Multivisor::load(config_source, Arc::new(XmlRpcConnector::new()), bus)
            .with_context(|| format!("Failed to load configuration from {}", args.config))?,
    );

    // 4. JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: args.host.clone(),
        port: args.port,
    };
    let rpc_handle = RpcServer::new(rpc_config, Arc::clone(&multivisor), Arc::clone(&broker))
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 5. Poll loop
    let poller = Poller::new(Arc::clone(&multivisor), args.poll_period()).spawn();

    info!(
        supervisors = multivisor.supervisors().await.len(),
        "System ready. Press Ctrl+C to shutdown"
    );

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    if let Err(e) = rpc_handle.stop() {
        warn!(error = ?e, "RPC server already stopped");
    }
    if !poller.stop(Duration::from_secs(5)).await {
        error!("Poller did not stop within 5s");
    }
    broker_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
