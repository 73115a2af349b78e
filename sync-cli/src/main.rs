//! # chatsync
//!
//! CLI tool for inspecting and driving a chatsync message store.
//!
//! ## Commands
//!
//! - `status`: Summarize the store
//! - `channels`: List channels and their cursors
//! - `messages`: Print confirmed messages of a channel
//! - `view`: Print the merged view (confirmed + pending) of a channel
//! - `outbox`: List, retry or cancel unconfirmed sends
//! - `send`: Queue a message
//! - `apply`: Apply a captured page of messages
//! - `clear`: Remove every cached record
//! - `destroy`: Delete the store from disk
//!
//! ## Example
//!
//! ```bash
//! # Queue a message while offline
//! chatsync send c1 "hello"
//!
//! # Apply a page captured from the transport
//! chatsync apply c1 page.json
//!
//! # Look at what the UI would render
//! chatsync view c1
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{apply, channels, clear, messages, outbox, send, status, view};

/// CLI tool for inspecting and driving a chatsync message store.
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the store and optional chatsync.toml
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Database file (overrides the configured path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Summarize the store
    Status,

    /// List channels and their cursors
    Channels,

    /// Print confirmed messages of a channel as JSON lines
    Messages {
        /// Channel id
        channel: String,

        /// Only messages after this seq
        #[arg(long, default_value = "0")]
        since: u64,

        /// Maximum number of messages
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Print the merged view of a channel as JSON lines
    View {
        /// Channel id
        channel: String,
    },

    /// List unconfirmed sends, or retry / cancel one
    Outbox {
        /// Queue a failed send again
        #[arg(long, conflicts_with = "cancel")]
        retry: Option<String>,

        /// Discard an unconfirmed send
        #[arg(long, conflicts_with = "retry")]
        cancel: Option<String>,
    },

    /// Queue a message for sending
    Send {
        /// Channel id
        channel: String,

        /// Message text (or use --json)
        text: Option<String>,

        /// Raw JSON payload
        #[arg(long, conflicts_with = "text")]
        json: Option<String>,

        /// Idempotency id to use instead of a generated one
        #[arg(long)]
        client_id: Option<String>,
    },

    /// Apply a JSON array of messages as one page
    Apply {
        /// Channel id
        channel: String,

        /// Page file (JSON array of messages)
        file: PathBuf,
    },

    /// Remove every cached record
    Clear {
        /// Confirm the operation
        #[arg(long)]
        yes: bool,
    },

    /// Delete the store from disk
    Destroy {
        /// Confirm the operation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let config = config::load(&data_dir, cli.config.as_deref(), cli.db)?;

    match cli.command {
        Commands::Status => status::run(&config).await?,
        Commands::Channels => channels::run(&config).await?,
        Commands::Messages {
            channel,
            since,
            limit,
        } => messages::run(&config, &channel, since, limit).await?,
        Commands::View { channel } => view::run(&config, &channel).await?,
        Commands::Outbox { retry, cancel } => {
            if let Some(id) = retry {
                outbox::retry(&config, &id).await?;
            } else if let Some(id) = cancel {
                outbox::cancel(&config, &id).await?;
            } else {
                outbox::list(&config).await?;
            }
        }
        Commands::Send {
            channel,
            text,
            json,
            client_id,
        } => {
            let payload = match (text, json) {
                (Some(text), None) => serde_json::json!({ "text": text }),
                (None, Some(raw)) => {
                    serde_json::from_str(&raw).context("--json is not valid JSON")?
                }
                _ => anyhow::bail!("Must specify message text or --json"),
            };
            send::run(&config, &channel, payload, client_id).await?;
        }
        Commands::Apply { channel, file } => apply::run(&config, &channel, &file).await?,
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear the store without --yes");
            }
            clear::clear(&config).await?;
        }
        Commands::Destroy { yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete the store without --yes");
            }
            clear::destroy(&config).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for chatsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "chatsync", "chatsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
