//! API gateway (demo transport)
//!
//! Runs the gateway core behind an HTTP listener.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌───────────────────────────────────────────────────────┐
//!                              │                     API GATEWAY                        │
//!                              │                                                        │
//!     Client Request           │  ┌─────────┐    ┌──────────┐    ┌──────────────────┐   │
//!     ─────────────────────────┼─▶│  http   │───▶│ routing  │───▶│    middleware    │   │
//!                              │  │ server  │    │ matcher  │    │     pipeline     │   │
//!                              │  └─────────┘    └──────────┘    │ cors → auth →    │   │
//!                              │                                 │ rate limit →     │   │
//!                              │                                 │ breaker → log    │   │
//!                              │                                 └────────┬─────────┘   │
//!                              │                                          ▼             │
//!     Client Response          │  ┌─────────┐    ┌──────────┐    ┌──────────────────┐   │
//!     ◀────────────────────────┼──│response │◀───│forwarder │◀───│  load_balancer   │◀──┼── Upstream
//!                              │  └─────────┘    └──────────┘    │ weighted random  │   │   Services
//!                              │                                 └──────────────────┘   │
//!                              │  ┌──────────────────────────────────────────────────┐  │
//!                              │  │ config · health · observability · resilience ·   │  │
//!                              │  │ security · lifecycle · admin                     │  │
//!                              │  └──────────────────────────────────────────────────┘  │
//!                              └───────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use api_gateway::admin::setup_admin_router;
use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::lifecycle::{trigger_on_signal, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::{Gateway, HttpServer};

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "API gateway with weighted load balancing and circuit breaking", long_about = None)]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        services = config.services.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let admin_listener = if config.admin.enabled {
        Some(TcpListener::bind(&config.admin.bind_address).await?)
    } else {
        None
    };

    let gateway = Arc::new(Gateway::new(config)?);
    let shutdown = Shutdown::new();
    tokio::spawn(trigger_on_signal(shutdown.clone()));

    let monitor = gateway.health_monitor();
    tokio::spawn(monitor.run(shutdown.subscribe()));

    let sweeper = gateway.clone();
    let mut sweep_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = ticker.tick() => sweeper.prune_rate_limits(),
                _ = sweep_shutdown.recv() => break,
            }
        }
    });

    if let Some(admin_listener) = admin_listener {
        let admin = setup_admin_router(gateway.clone());
        let admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(Shutdown::wait(admin_shutdown))
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin server failed");
            }
        });
    }

    HttpServer::new(gateway)
        .run(listener, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
