//! Service gateway (v1)
//!
//! A single entry point for a set of HTTP microservices plus a TCP
//! round-robin balancer, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                   SERVICE GATEWAY                     │
//!                     │                                                       │
//!   Client Request    │  ┌─────────┐    ┌──────────┐    ┌──────────────────┐  │
//!   ──────────────────┼─▶│  http   │───▶│ routing  │───▶│    forwarder     │──┼──▶ Service
//!                     │  │ server  │    │  table   │    │ breaker+registry │  │
//!                     │  └────┬────┘    └──────────┘    └──────────────────┘  │
//!                     │       │                                               │
//!                     │       ├──▶ registry endpoints  (/registry/*)          │
//!                     │       └──▶ aggregation         (/api/dashboard, ...)  │
//!                     │                                                       │
//!   TCP Client        │  ┌─────────┐    ┌──────────────┐                      │
//!   ──────────────────┼─▶│   net   │───▶│ load_balancer│──────────────────────┼──▶ Target
//!                     │  │listener │    │ round robin  │                      │
//!                     │  └─────────┘    └──────────────┘                      │
//!                     │                                                       │
//!                     │  config · observability · resilience · lifecycle      │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use service_gateway::lifecycle::{startup, StartupOptions};

#[derive(Parser, Debug)]
#[command(name = "service-gateway", version, about = "API gateway and TCP balancer")]
struct Args {
    /// Path to the TOML configuration file (hot reloaded)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the gateway listen address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    startup::run(StartupOptions {
        config_path: args.config,
        bind_override: args.bind,
    })
    .await?;

    Ok(())
}
