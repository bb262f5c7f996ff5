use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use service_gateway::registry::{Registration, RegistryClient};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the service gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000", env = "GATEWAY_URL")]
    url: String,

    /// Bearer token sent as `Authorization` (dashboard and search)
    #[arg(short, long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway health and registered services
    Health,
    /// List the registry
    Registry,
    /// Show one registered service
    Discover { name: String },
    /// Register a service at a base URL
    Register {
        name: String,
        service_url: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Remove a service from the registry
    Unregister { name: String },
    /// Circuit breaker states
    Circuits,
    /// Aggregated dashboard
    Dashboard,
    /// Search across services
    Search { query: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    }

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Registry => {
            let res = client.get(format!("{}/registry", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Discover { name } => {
            let res = client.get(format!("{}/registry/{}", base, name)).send().await?;
            print_response(res).await?;
        }
        Commands::Register {
            name,
            service_url,
            version,
        } => {
            let mut registration = Registration::new(service_url);
            registration.version = version;
            let record = RegistryClient::new(base).register(&name, &registration).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Unregister { name } => {
            RegistryClient::new(base).unregister(&name).await?;
            println!("Service {} unregistered", name);
        }
        Commands::Circuits => {
            let res = client.get(format!("{}/circuit-breakers", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Dashboard => {
            let res = client
                .get(format!("{}/api/dashboard", base))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Search { query } => {
            let res = client
                .get(format!("{}/api/search", base))
                .query(&[("q", query)])
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
