//! Show store status.

use anyhow::Result;
use sync_store::config::Config;
use sync_types::OutboxStatus;

use crate::config::open_engine;

/// Run the status command.
pub async fn run(config: &Config) -> Result<()> {
    let engine = open_engine(config).await?;
    let channels = engine.list_channels().await?;
    let pending = engine.list_pending_outbox().await?;

    println!("=== chatsync status ===");
    println!();

    println!("Store:");
    println!("  Path:     {}", config.storage.database.display());
    println!("  Channels: {}", channels.len());
    if let Some(top) = channels.iter().max_by_key(|c| c.max_seq) {
        println!("  Furthest: {} (seq {})", top.id, top.max_seq);
    }

    println!();

    println!("Outbox:");
    println!("  Pending:  {}", pending.len());
    for status in [
        OutboxStatus::Queued,
        OutboxStatus::Sending,
        OutboxStatus::Sent,
        OutboxStatus::Failed,
    ] {
        let count = pending.iter().filter(|e| e.status == status).count();
        if count > 0 {
            println!("    {:<8} {}", status, count);
        }
    }
    if let Some(oldest) = pending.first() {
        println!("  Oldest:   {}", format_age(oldest.created_at));
    }
    match config.outbox.max_pending {
        0 => println!("  Capacity: unbounded"),
        n => println!("  Capacity: {}", n),
    }

    Ok(())
}

/// Format a unix-millis timestamp as a rough age.
fn format_age(ts_millis: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    let diff = now.saturating_sub(ts_millis).max(0) / 1000;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
