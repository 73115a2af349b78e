//! Clear or delete the store.

use anyhow::{Context, Result};
use sync_store::config::Config;

use crate::config::open_engine;

/// Remove every cached record; the database file stays.
pub async fn clear(config: &Config) -> Result<()> {
    let engine = open_engine(config).await?;
    engine.clear_all().await.context("Failed to clear store")?;
    println!("Cleared {}", config.storage.database.display());
    Ok(())
}

/// Delete the database file and its journal.
pub async fn destroy(config: &Config) -> Result<()> {
    let engine = open_engine(config).await?;
    engine
        .delete_store()
        .await
        .context("Failed to delete store")?;
    println!("Deleted {}", config.storage.database.display());
    Ok(())
}
