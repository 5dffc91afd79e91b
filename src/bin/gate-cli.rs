use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use request_gate::auth::{hash_key, InMemoryPrincipalStore, PrincipalId, PrincipalStore, TokenVerifier};
use request_gate::config::load_config;

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Management CLI for the request gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin bearer token.
    #[arg(short, long, env = "GATE_ADMIN_TOKEN", default_value = "")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gate status and configured policies
    Status,
    /// Show a principal
    User { id: String },
    /// Clear a rate-limit counter
    ResetLimit { policy: String, subject: String },
    /// Drop a principal's cached session
    InvalidateSession { id: String },
    /// Print the SHA-256 digest to configure for a service API key
    HashKey { key: String },
    /// Sign a token for a seeded principal using the gate's configuration
    IssueToken {
        #[arg(short, long)]
        config: PathBuf,
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.token.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", cli.token))?,
        );
    }

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::User { id } => {
            let res = client.get(format!("{}/admin/users/{}", cli.url, id))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::ResetLimit { policy, subject } => {
            let res = client.delete(format!("{}/admin/rate-limits/{}/{}", cli.url, policy, subject))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::InvalidateSession { id } => {
            let res = client.delete(format!("{}/admin/sessions/{}", cli.url, id))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::HashKey { key } => {
            println!("{}", hash_key(&key));
        }
        Commands::IssueToken { config, id } => {
            let config = load_config(&config)?;
            let principals = InMemoryPrincipalStore::from_seed(&config.principals);
            let Some(principal) = principals.find_by_id(&PrincipalId::new(id.clone())).await? else {
                eprintln!("Error: no seeded principal with id '{}'", id);
                std::process::exit(1);
            };
            println!("{}", TokenVerifier::new(&config.auth).issue(&principal)?);
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Gate returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
