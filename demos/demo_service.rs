//! A tiny backend that registers itself with a running gateway.
//!
//! ```text
//! cargo run --example demo_service -- --name product-service --port 3002
//! curl http://localhost:3000/api/products
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use axum::{extract::Query, routing::get, Json, Router};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};

use service_gateway::lifecycle::{signals, Shutdown};
use service_gateway::registry::{Registration, RegistryClient};

#[derive(Parser, Debug)]
struct Args {
    /// Name to register under
    #[arg(long, default_value = "product-service")]
    name: String,

    #[arg(long, default_value_t = 3002)]
    port: u16,

    #[arg(long, default_value = "http://localhost:3000")]
    gateway: String,

    /// Seconds between heartbeats
    #[arg(long, default_value_t = 10)]
    heartbeat_secs: u64,
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

fn catalog() -> Vec<Value> {
    vec![
        json!({ "id": 1, "name": "Coffee", "category": "groceries" }),
        json!({ "id": 2, "name": "Notebook", "category": "stationery" }),
        json!({ "id": 3, "name": "Headphones", "category": "electronics" }),
    ]
}

async fn list() -> Json<Value> {
    Json(json!({ "success": true, "data": catalog() }))
}

async fn categories() -> Json<Value> {
    Json(json!({ "success": true, "data": ["groceries", "stationery", "electronics"] }))
}

async fn search(Query(params): Query<SearchParams>) -> Json<Value> {
    let q = params.q.unwrap_or_default().to_lowercase();
    let results: Vec<Value> = catalog()
        .into_iter()
        .filter(|item| {
            item["name"]
                .as_str()
                .map(|n| n.to_lowercase().contains(&q))
                .unwrap_or(false)
        })
        .collect();
    Json(json!({ "success": true, "data": { "results": results, "total": results.len() } }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let app = Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "healthy" })) }))
        .route("/", get(list))
        .route("/products", get(list))
        .route("/items", get(list))
        .route("/categories", get(categories))
        .route("/search", get(search));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(service = %args.name, address = %addr, "Demo service listening");

    let registry = RegistryClient::new(&args.gateway);
    let mut registration = Registration::new(format!("http://{}", addr));
    registration.version = Some(env!("CARGO_PKG_VERSION").to_string());
    match registry.register(&args.name, &registration).await {
        Ok(record) => tracing::info!(service = %record.name, "Registered with gateway"),
        Err(e) => tracing::warn!(error = %e, "Registration failed, serving anyway"),
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());
    let heartbeat = registry.spawn_heartbeat(
        args.name.clone(),
        Duration::from_secs(args.heartbeat_secs.max(1)),
        shutdown.subscribe(),
    );

    let mut stop = shutdown.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = stop.recv().await;
        })
        .await?;

    heartbeat.abort();
    if let Err(e) = registry.unregister(&args.name).await {
        tracing::warn!(error = %e, "Unregister failed");
    }
    Ok(())
}
