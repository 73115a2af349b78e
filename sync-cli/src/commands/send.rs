//! Queue a message for sending.

use anyhow::Result;
use serde_json::Value;
use sync_store::config::Config;
use sync_types::{ChannelId, ClientMsgId};

use crate::config::open_engine;

/// Run the send command. Prints the client message id.
pub async fn run(
    config: &Config,
    channel: &str,
    payload: Value,
    client_id: Option<String>,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let channel = ChannelId::from(channel);

    let id = match client_id {
        Some(id) => {
            engine
                .enqueue_send_with_id(&channel, ClientMsgId::new(id), payload)
                .await?
                .client_msg_id
        }
        None => engine.enqueue_send(&channel, payload).await?,
    };

    println!("{}", id);
    Ok(())
}
