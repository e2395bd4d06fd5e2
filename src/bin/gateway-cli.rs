use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the API gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// Request rollups, optionally bounded by epoch milliseconds
    Metrics {
        #[arg(long)]
        start: Option<u64>,
        #[arg(long)]
        end: Option<u64>,
    },
    /// Recent request log
    Requests,
    /// Service instances and their health
    Services,
    /// Circuit breaker states
    Breakers,
    /// Stop routing traffic to an instance
    Drain { service: String, endpoint: String },
    /// Return a drained instance to rotation
    Undrain { service: String, endpoint: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Metrics { start, end } => {
            let mut query = Vec::new();
            if let Some(start) = start {
                query.push(("start", start));
            }
            if let Some(end) = end {
                query.push(("end", end));
            }
            client.get(format!("{}/admin/metrics", base)).query(&query)
        }
        Commands::Requests => client.get(format!("{}/admin/requests", base)),
        Commands::Services => client.get(format!("{}/admin/services", base)),
        Commands::Breakers => client.get(format!("{}/admin/breakers", base)),
        Commands::Drain { service, endpoint } => client
            .post(format!("{}/admin/services/{}/status", base, service))
            .json(&json!({ "endpoint": endpoint, "status": "draining" })),
        Commands::Undrain { service, endpoint } => client
            .post(format!("{}/admin/services/{}/status", base, service))
            .json(&json!({ "endpoint": endpoint, "status": "healthy" })),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
