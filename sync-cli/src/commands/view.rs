//! Print the merged view of a channel.

use anyhow::Result;
use sync_store::config::Config;
use sync_types::ChannelId;

use crate::config::open_engine;

/// Run the view command.
///
/// Confirmed rows come first in seq order, then pending sends. Each line is a
/// JSON object tagged with `"state": "confirmed" | "pending"`.
pub async fn run(config: &Config, channel: &str) -> Result<()> {
    let engine = open_engine(config).await?;
    let view = engine.get_merged_view(&ChannelId::from(channel)).await?;

    for item in &view {
        println!("{}", serde_json::to_string(item)?);
    }
    Ok(())
}
