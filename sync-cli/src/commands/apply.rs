//! Apply a captured page of messages.

use anyhow::{Context, Result};
use std::path::Path;
use sync_store::config::Config;
use sync_types::{ChannelId, Message};

use crate::config::open_engine;

/// Run the apply command.
///
/// `file` holds a JSON array of messages as the transport delivers them.
pub async fn run(config: &Config, channel: &str, file: &Path) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read page file {}", file.display()))?;
    let messages: Vec<Message> =
        serde_json::from_str(&contents).context("Page file is not a JSON array of messages")?;

    let engine = open_engine(config).await?;
    let report = engine
        .apply_incoming_messages(&ChannelId::from(channel), messages)
        .await?;

    println!(
        "Applied page to {}: {} new, {} duplicate, cursor {} -> {}",
        report.channel_id, report.inserted, report.duplicates, report.previous_max, report.new_max
    );
    if report.seq_conflicts > 0 {
        println!("  Skipped {} message(s) with a conflicting seq", report.seq_conflicts);
    }
    for id in &report.confirmed {
        println!("  Confirmed local send {}", id);
    }
    Ok(())
}
