use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "plant-care-cli")]
#[command(about = "Management CLI for the plant care backend", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[arg(short, long, env = "PLANT_CARE_ADMIN_API_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detailed health of every component
    Health,
    /// System overview
    Dashboard,
    /// List users
    Users {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one user with profile, subscription and statistics
    User { user_id: String },
    /// Suspend a user
    Suspend {
        user_id: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Reactivate a user
    Activate { user_id: String },
    /// Clear cache entries, optionally by glob pattern
    ClearCache {
        #[arg(long)]
        pattern: Option<String>,
    },
    /// List rate limit rules
    RateLimits,
    /// Reset one rate limit slot
    ResetRateLimit { rule: String, identifier: String },
    /// Circuit breaker states
    Breakers,
    /// Reset a circuit breaker, or all of them
    ResetBreaker { name: Option<String> },
    /// Event bus statistics
    Events,
    /// Dead-lettered events
    DeadLetters,
    /// Background job statistics
    Jobs,
    /// Run a task now
    Trigger {
        task: String,
        #[arg(long)]
        queue: Option<String>,
    },
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

    let (method, path, body) = match cli.command {
        Commands::Health => (Method::GET, "/health/detailed".to_string(), None),
        Commands::Dashboard => (Method::GET, "/admin/dashboard".to_string(), None),
        Commands::Users { status, search, limit } => {
            let mut path = format!("/admin/users?limit={limit}");
            if let Some(status) = status {
                path.push_str(&format!("&status={status}"));
            }
            if let Some(search) = search {
                path.push_str(&format!("&search={search}"));
            }
            (Method::GET, path, None)
        }
        Commands::User { user_id } => (Method::GET, format!("/admin/users/{user_id}"), None),
        Commands::Suspend { user_id, reason } => (
            Method::PUT,
            format!("/admin/users/{user_id}/status"),
            Some(json!({ "status": "suspended", "reason": reason })),
        ),
        Commands::Activate { user_id } => (
            Method::PUT,
            format!("/admin/users/{user_id}/status"),
            Some(json!({ "status": "active" })),
        ),
        Commands::ClearCache { pattern } => {
            let path = match pattern {
                Some(pattern) => format!("/admin/cache?pattern={pattern}"),
                None => "/admin/cache".to_string(),
            };
            (Method::DELETE, path, None)
        }
        Commands::RateLimits => (Method::GET, "/admin/rate-limits".to_string(), None),
        Commands::ResetRateLimit { rule, identifier } => (
            Method::POST,
            "/admin/rate-limits/reset".to_string(),
            Some(json!({ "rule": rule, "identifier": identifier })),
        ),
        Commands::Breakers => (Method::GET, "/admin/circuit-breakers".to_string(), None),
        Commands::ResetBreaker { name } => {
            let path = match name {
                Some(name) => format!("/admin/circuit-breakers/{name}/reset"),
                None => "/admin/circuit-breakers/reset".to_string(),
            };
            (Method::POST, path, None)
        }
        Commands::Events => (Method::GET, "/admin/events".to_string(), None),
        Commands::DeadLetters => (Method::GET, "/admin/events/dead-letters".to_string(), None),
        Commands::Jobs => (Method::GET, "/admin/jobs".to_string(), None),
        Commands::Trigger { task, queue } => (
            Method::POST,
            format!("/admin/jobs/{task}/trigger"),
            Some(json!({ "queue": queue })),
        ),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url, path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
