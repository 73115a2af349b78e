//! Configuration resolution for the chatsync CLI.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use sync_store::config::Config;
use sync_store::{SqliteStore, SyncEngine};

/// Name of the configuration file looked up in the data directory.
pub const CONFIG_FILE: &str = "chatsync.toml";

/// Resolve the effective configuration.
///
/// Precedence: `--config` file, then `chatsync.toml` in the data directory,
/// then defaults. A relative database path is taken relative to the data
/// directory; `--db` overrides it entirely.
pub fn load(data_dir: &Path, explicit: Option<&Path>, db: Option<PathBuf>) -> Result<Config> {
    let in_data_dir = data_dir.join(CONFIG_FILE);

    let mut config = match explicit {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None if in_data_dir.exists() => Config::from_file(&in_data_dir)
            .with_context(|| format!("Failed to load config {}", in_data_dir.display()))?,
        None => Config::default(),
    };

    if let Some(path) = db {
        config.storage.database = path;
    } else if config.storage.database.is_relative() {
        config.storage.database = data_dir.join(&config.storage.database);
    }

    Ok(config)
}

/// Open the SQLite store described by `config` and wrap it in an engine.
pub async fn open_engine(config: &Config) -> Result<SyncEngine<SqliteStore>> {
    let store = SqliteStore::open(&config.storage).await.with_context(|| {
        format!(
            "Failed to open store {}",
            config.storage.database.display()
        )
    })?;
    Ok(SyncEngine::new(store, config.clone()))
}
