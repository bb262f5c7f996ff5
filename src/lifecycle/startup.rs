//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics before anything else logs
//! - Start background tasks (config watcher, health checks)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: configuration and bind errors are fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::loader::{apply_env_overrides, load_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::watcher::ConfigWatcher;
use crate::config::GatewayConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::load_balancer::TcpBalancer;
use crate::net::{Listener, ListenerError};
use crate::observability::{logging, metrics};
use crate::registry::ServiceRegistry;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("balancer listener: {0}")]
    Listener(#[from] ListenerError),
    #[error("gateway listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Command-line level options.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    pub config_path: Option<PathBuf>,
    pub bind_override: Option<String>,
}

/// Resolve the effective configuration: file (or defaults), environment, flags.
pub fn resolve_config(options: &StartupOptions) -> Result<GatewayConfig, ConfigError> {
    let mut config = match &options.config_path {
        Some(path) => load_config(path)?,
        None => {
            let mut config = GatewayConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        }
    };

    if let Some(bind) = &options.bind_override {
        config.listener.bind_address = bind.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Run the gateway (and the balancer when enabled) until a shutdown signal.
pub async fn run(options: StartupOptions) -> Result<(), StartupError> {
    let config = resolve_config(&options)?;
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        proxy_timeout_secs = config.proxy.timeout_secs,
        failure_threshold = config.circuit_breaker.failure_threshold,
        balancer_enabled = config.balancer.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let registry = ServiceRegistry::new();
    let server = HttpServer::with_registry(config.clone(), registry);

    // Kept alive for the lifetime of the server.
    let _watcher = match &options.config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            server.watch_config(updates);
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload unavailable");
                    None
                }
            }
        }
        None => None,
    };

    let balancer_task = if config.balancer.enabled {
        let listener = Listener::bind(&config.balancer.listener).await?;
        let balancer = TcpBalancer::new(&config.balancer);
        Some(tokio::spawn(balancer.run(listener, shutdown.subscribe())))
    } else {
        None
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    server.run(listener, shutdown.subscribe()).await?;

    if let Some(task) = balancer_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Balancer task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
