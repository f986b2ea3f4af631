//! psry CLI: command-line client for the psry API.
//!
//! Set PSRY_API_URL (or API_URL) to point at the server; defaults to http://localhost:4000.

use anyhow::Context;
use clap::{Parser, Subcommand};
use psry_cli::{format_record, format_table, init_tracing, ApiClient};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "psry", about = "psry image pipeline CLI")]
struct Cli {
    /// API base URL (overrides PSRY_API_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Print raw JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an image file
    Upload {
        /// Path to the image to upload
        file: std::path::PathBuf,
    },
    /// List every processing record
    List,
    /// Show a single record by ID
    Get {
        /// Record ID (the object key returned by upload)
        id: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let client = match cli.url.as_deref() {
        Some(url) => ApiClient::new(url),
        None => ApiClient::from_env(),
    }
    .context("Failed to create API client")?;

    match cli.command {
        Commands::Upload { file } => {
            let response = client.upload(&file).await?;
            if cli.json {
                print_json(&response)?;
            } else {
                println!("{}", response.url);
            }
        }
        Commands::List => {
            let records = client.list_records().await?;
            if cli.json {
                print_json(&records)?;
            } else {
                print!("{}", format_table(&records));
            }
        }
        Commands::Get { id } => {
            let record = client.get_record(&id).await?;
            if cli.json {
                print_json(&record)?;
            } else {
                print!("{}", format_record(&record));
            }
        }
    }

    Ok(())
}
