//! Print confirmed messages.

use anyhow::Result;
use sync_store::config::Config;
use sync_store::PageRequest;
use sync_types::{ChannelId, Seq};

use crate::config::open_engine;

/// Run the messages command.
///
/// Prints one JSON object per line, ascending by seq.
pub async fn run(config: &Config, channel: &str, since: u64, limit: Option<u32>) -> Result<()> {
    let engine = open_engine(config).await?;

    let request = PageRequest {
        since_seq: Seq::new(since),
        limit,
    };
    let messages = engine
        .get_messages(&ChannelId::from(channel), request)
        .await?;

    for message in &messages {
        println!("{}", serde_json::to_string(message)?);
    }
    Ok(())
}
