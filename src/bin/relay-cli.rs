use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Management CLI for the session relay", long_about = None)]
struct Cli {
    /// Base URL of the relay listener
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Admin API key (not needed for `health`)
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show readiness as reported by /health
    Health,
    /// Show health, session counts and upstream pools
    Status,
    /// List sessions
    Sessions,
    /// Run one session sweep now
    Sweep,
    /// Close a session
    Close {
        /// Session key
        key: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    let res = match &cli.command {
        Commands::Health => client.get(format!("{base}/health")).send().await?,
        Commands::Status => {
            client
                .get(format!("{base}/admin/status"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Sessions => {
            client
                .get(format!("{base}/admin/sessions"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Sweep => {
            client
                .post(format!("{base}/admin/sweep"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Close { key } => {
            client
                .delete(format!("{base}/admin/sessions/{key}"))
                .headers(headers)
                .send()
                .await?
        }
    };

    // /health answers 503 with a body worth showing.
    let show_errors = matches!(cli.command, Commands::Health);
    print_response(res, show_errors).await
}

async fn print_response(
    res: reqwest::Response,
    show_error_body: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if status == StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }
    if !status.is_success() && !show_error_body {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
