//! Destination health control plane.
//!
//! # Architecture Overview
//!
//! ```text
//!     config file ──▶ loader + validation ──▶ ClusterRegistry ──▶ ActiveHealthCheckMonitor
//!          │                                        │                      │
//!       watcher (reload)                            ▼                      ▼ probes
//!                                           ClusterState ◀── DestinationHealthUpdater
//!                                                   │               ▲
//!     forwarding engine ──▶ Dispatcher ──▶ LoadBalancer        passive policies
//!                                │                                  ▲
//!                                └──── DispatchLease::complete ─────┘
//!
//!     admin API (axum) reads everything above; metrics exported on a separate port
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use proxy_health::admin::{setup_admin_router, AdminState};
use proxy_health::config::watcher::ConfigWatcher;
use proxy_health::config::{load_config, ProxyConfig};
use proxy_health::lifecycle::{HealthServices, Shutdown, SignalEvent, Signals};
use proxy_health::observability::logging;

#[derive(Parser)]
#[command(name = "proxy-health", version, about = "Destination health checking and load balancing")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "proxy-health.toml")]
    config: PathBuf,

    /// Do not reload the configuration when the file changes
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy-health starting");
    tracing::info!(
        path = ?args.config,
        clusters = config.clusters.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = proxy_health::observability::metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = Arc::new(HealthServices::new(&config));
    if let Err(errors) = services.start(&config).await {
        for error in &errors {
            tracing::error!(error = %error, "Invalid configuration");
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    let shutdown = Shutdown::new();

    let _watcher = if args.no_watch {
        None
    } else {
        let (watcher, mut updates) = ConfigWatcher::new(&args.config);
        let handle = watcher.run()?;
        let services = services.clone();
        let token = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    update = updates.recv() => match update {
                        Some(config) => apply(&services, &config),
                        None => break,
                    },
                }
            }
        });
        Some(handle)
    };

    let admin = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(services.clone(), config.admin.api_key.as_str()));
        let token = shutdown.subscribe();
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        }))
    } else {
        None
    };

    let mut signals = Signals::new()?;
    loop {
        match signals.recv().await {
            SignalEvent::Shutdown => break,
            SignalEvent::Reload => match load_config(&args.config) {
                Ok(config) => apply(&services, &config),
                Err(e) => tracing::error!(error = %e, "Failed to reload config, keeping current clusters"),
            },
        }
    }

    shutdown.trigger();
    services.shutdown();
    if let Some(admin) = admin {
        match admin.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
            Err(e) => tracing::error!(error = %e, "Admin API task failed"),
            Ok(Ok(())) => {}
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn apply(services: &HealthServices, config: &ProxyConfig) {
    if let Err(errors) = services.apply(config) {
        for error in &errors {
            tracing::error!(error = %error, "Rejected configuration revision");
        }
    }
}
