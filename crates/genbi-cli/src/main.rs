//! GenBI CLI: drive the upload staging endpoints by hand.
//!
//! Set GENBI_API_URL and GENBI_API_TOKEN (or GENBI_API_KEY). Output is JSON on stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use genbi_api_client::ApiClient;
use genbi_cli::{finalize_items, init_tracing, load_file, resolve_folder};
use genbi_core::UploadDefaults;
use serde::Serialize;
use serde_json::json;

#[derive(Parser)]
#[command(name = "genbi", about = "GenBI upload staging CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file to temporary storage
    Stage {
        /// Path to the file to stage
        file: std::path::PathBuf,
    },
    /// Move a staged file to permanent storage
    Finalize {
        /// Staging id returned by `stage`
        temp_id: String,
        /// Destination folder (defaults to GENBI_UPLOAD_FOLDER)
        #[arg(long)]
        folder: Option<String>,
    },
    /// Move several staged files to permanent storage in one request
    FinalizeBulk {
        /// Staging ids returned by `stage`
        #[arg(required = true)]
        temp_ids: Vec<String>,
        /// Destination folder (defaults to GENBI_UPLOAD_FOLDER)
        #[arg(long)]
        folder: Option<String>,
    },
    /// Delete a staged file
    Discard {
        /// Staging id returned by `stage`
        temp_id: String,
    },
    /// Upload a file straight to permanent storage
    Upload {
        /// Path to the file to upload
        file: std::path::PathBuf,
        /// Destination folder (defaults to GENBI_UPLOAD_FOLDER)
        #[arg(long)]
        folder: Option<String>,
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

    let client = ApiClient::from_env().context(
        "Failed to create API client. Set GENBI_API_URL and GENBI_API_TOKEN (or GENBI_API_KEY)",
    )?;
    let defaults = UploadDefaults::from_env();

    match cli.command {
        Commands::Stage { file } => {
            let raw = load_file(&file, &defaults)?;
            let staged = client.stage_file(&raw).await?;
            print_json(&staged)?;
        }
        Commands::Finalize { temp_id, folder } => {
            let folder = resolve_folder(folder, &defaults);
            let upload = client.finalize_staged(&temp_id, &folder).await?;
            print_json(&upload)?;
        }
        Commands::FinalizeBulk { temp_ids, folder } => {
            let folder = resolve_folder(folder, &defaults);
            let outcome = client
                .finalize_staged_bulk(&finalize_items(&temp_ids, &folder))
                .await?;
            if !outcome.is_complete() {
                tracing::warn!(failed = outcome.failed.len(), "Some files could not be finalized");
            }
            print_json(&outcome)?;
        }
        Commands::Discard { temp_id } => {
            client.discard_staged(&temp_id).await?;
            print_json(&json!({ "deleted": true, "tempId": temp_id }))?;
        }
        Commands::Upload { file, folder } => {
            let raw = load_file(&file, &defaults)?;
            let folder = resolve_folder(folder, &defaults);
            let upload = client.upload_file(&raw, &folder).await?;
            print_json(&upload)?;
        }
    }

    Ok(())
}
