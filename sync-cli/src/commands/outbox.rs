//! Inspect and manage unconfirmed sends.

use anyhow::{bail, Result};
use sync_store::config::Config;
use sync_types::ClientMsgId;

use crate::config::open_engine;

/// List every unconfirmed send, oldest first.
pub async fn list(config: &Config) -> Result<()> {
    let engine = open_engine(config).await?;
    let pending = engine.list_pending_outbox().await?;

    if pending.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    for entry in pending {
        println!(
            "{}\t{}\t{}\t{}",
            entry.client_msg_id,
            entry.channel_id,
            entry.status,
            serde_json::to_string(&entry.payload)?
        );
    }
    Ok(())
}

/// Queue a failed send again.
pub async fn retry(config: &Config, id: &str) -> Result<()> {
    let engine = open_engine(config).await?;

    match engine.retry_send(&ClientMsgId::from(id)).await? {
        Some(entry) => println!("{} is {}", entry.client_msg_id, entry.status),
        None => bail!("No outbox entry {}", id),
    }
    Ok(())
}

/// Discard an unconfirmed send.
pub async fn cancel(config: &Config, id: &str) -> Result<()> {
    let engine = open_engine(config).await?;

    if !engine.cancel_send(&ClientMsgId::from(id)).await? {
        bail!("No outbox entry {}", id);
    }
    println!("Cancelled {}", id);
    Ok(())
}
