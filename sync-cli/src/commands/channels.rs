//! List channels.

use anyhow::Result;
use sync_store::config::Config;

use crate::config::open_engine;

/// Run the channels command.
pub async fn run(config: &Config) -> Result<()> {
    let engine = open_engine(config).await?;
    let channels = engine.list_channels().await?;

    if channels.is_empty() {
        println!("No channels synced yet.");
        return Ok(());
    }

    for channel in channels {
        println!("{}\t{}", channel.id, channel.max_seq);
    }
    Ok(())
}
