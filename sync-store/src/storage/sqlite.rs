//! SQLite storage backend for chatsync.

use super::{now_millis, CommitOutcome, OfflineStorage, StoreBackend, SyncStorage};
use crate::config::StorageConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use sync_core::{apply_update, mirror_into, PagePlan};
use sync_types::{
    ChannelId, ChannelMeta, ClientMsgId, LocalMessage, Message, MessageId, OutboxEntry,
    OutboxStatus, OutboxUpdate, Seq, SyncCursor, SyncState, Version, VersionStamp,
};

/// SQLite-backed message cache.
///
/// Uses WAL mode so readers are not blocked by page commits. Opaque values
/// (content, reactions, payloads, sync state) are stored as MessagePack blobs.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at `path` with default pool settings.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let config = StorageConfig {
            database: path.to_path_buf(),
            ..StorageConfig::default()
        };
        Self::open(&config).await
    }

    /// Open (or create) a store as described by `config`.
    ///
    /// Missing parent directories are created.
    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let path = &config.database;
        if path.as_os_str().is_empty() || path.is_dir() {
            return Err(StorageError::InvalidPath { path: path.clone() });
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            path: Some(path.clone()),
        };
        store.run_migrations().await?;

        tracing::info!(path = %path.display(), "opened message store");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // One connection that never recycles; a fresh one would see an empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool, path: None };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Path of the database file, if the store is file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                channel_id TEXT NOT NULL,
                id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                client_msg_id TEXT,
                content BLOB NOT NULL,
                reactions BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                edited_at INTEGER,
                deleted INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (channel_id, id),
                UNIQUE (channel_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_cursors (
                channel_id TEXT PRIMARY KEY,
                max_seq INTEGER NOT NULL DEFAULT 0,
                sync_state BLOB
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                max_seq INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                client_msg_id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                payload BLOB NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_messages (
                client_msg_id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                content BLOB NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS version_stamps (
                message_id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                observed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_id ON messages(id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_client_msg_id ON messages(client_msg_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_local_messages_channel ON local_messages(channel_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SyncStorage for SqliteStore {
    async fn get_message(
        &self,
        channel_id: &ChannelId,
        id: &MessageId,
    ) -> Result<Option<Message>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        select_message(&mut conn, channel_id, id).await
    }

    async fn find_message(&self, id: &MessageId) -> Result<Option<Message>, StorageError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 LIMIT 1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn get_message_by_client_id(
        &self,
        client_msg_id: &ClientMsgId,
    ) -> Result<Option<Message>, StorageError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE client_msg_id = ?1 LIMIT 1"
        ))
        .bind(client_msg_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn get_messages_after(
        &self,
        channel_id: &ChannelId,
        after: Seq,
        limit: u32,
    ) -> Result<Vec<Message>, StorageError> {
        // No stored seq can exceed i64::MAX.
        let Ok(after) = i64::try_from(after.value()) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE channel_id = ?1 AND seq > ?2
            ORDER BY seq ASC
            LIMIT ?3
            "#
        ))
        .bind(channel_id.as_str())
        .bind(after)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn get_cursor(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<SyncCursor>, StorageError> {
        let row = sqlx::query_as::<_, CursorRow>(
            "SELECT channel_id, max_seq, sync_state FROM sync_cursors WHERE channel_id = ?1",
        )
        .bind(channel_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncCursor::try_from).transpose()
    }

    async fn put_cursor(&self, cursor: &SyncCursor) -> Result<(), StorageError> {
        let max_seq = to_db("max_seq", cursor.max_seq.value())?;
        let sync_state = cursor
            .sync_state
            .as_ref()
            .map(rmp_serde::to_vec_named)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sync_cursors (channel_id, max_seq, sync_state)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(channel_id) DO UPDATE
            SET max_seq = excluded.max_seq, sync_state = excluded.sync_state
            "#,
        )
        .bind(cursor.channel_id.as_str())
        .bind(max_seq)
        .bind(sync_state)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO channels (id, max_seq) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET max_seq = excluded.max_seq
            "#,
        )
        .bind(cursor.channel_id.as_str())
        .bind(max_seq)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelMeta>, StorageError> {
        let row = sqlx::query_as::<_, ChannelRow>("SELECT id, max_seq FROM channels WHERE id = ?1")
            .bind(channel_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ChannelMeta::try_from).transpose()
    }

    async fn list_channels(&self) -> Result<Vec<ChannelMeta>, StorageError> {
        let rows = sqlx::query_as::<_, ChannelRow>("SELECT id, max_seq FROM channels ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ChannelMeta::try_from).collect()
    }
}

#[async_trait]
impl OfflineStorage for SqliteStore {
    async fn add_outbox(&self, entry: &OutboxEntry) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        insert_outbox(&mut conn, entry).await
    }

    async fn get_outbox(&self, id: &ClientMsgId) -> Result<Option<OutboxEntry>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        select_outbox(&mut conn, id).await
    }

    async fn update_outbox(
        &self,
        id: &ClientMsgId,
        update: &OutboxUpdate,
    ) -> Result<Option<OutboxEntry>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let updated = update_outbox_row(&mut tx, id, update).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn remove_outbox(&self, id: &ClientMsgId) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        delete_outbox(&mut conn, id).await
    }

    async fn list_outbox(&self) -> Result<Vec<OutboxEntry>, StorageError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT client_msg_id, channel_id, payload, status, created_at, updated_at
            FROM outbox
            ORDER BY created_at ASC, client_msg_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OutboxEntry::try_from).collect()
    }

    async fn put_local(&self, local: &LocalMessage) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        upsert_local(&mut conn, local).await
    }

    async fn get_local(&self, id: &ClientMsgId) -> Result<Option<LocalMessage>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        select_local(&mut conn, id).await
    }

    async fn update_local_status(
        &self,
        id: &ClientMsgId,
        status: OutboxStatus,
    ) -> Result<Option<LocalMessage>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE local_messages SET status = ?1 WHERE client_msg_id = ?2")
            .bind(status.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let local = select_local(&mut tx, id).await?;
        tx.commit().await?;
        Ok(local)
    }

    async fn remove_local(&self, id: &ClientMsgId) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        delete_local(&mut conn, id).await
    }

    async fn list_local(
        &self,
        channel_id: Option<&ChannelId>,
    ) -> Result<Vec<LocalMessage>, StorageError> {
        let rows = match channel_id {
            Some(channel_id) => {
                sqlx::query_as::<_, LocalRow>(
                    r#"
                    SELECT client_msg_id, channel_id, content, status, created_at
                    FROM local_messages
                    WHERE channel_id = ?1
                    ORDER BY created_at ASC, client_msg_id ASC
                    "#,
                )
                .bind(channel_id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LocalRow>(
                    r#"
                    SELECT client_msg_id, channel_id, content, status, created_at
                    FROM local_messages
                    ORDER BY created_at ASC, client_msg_id ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(LocalMessage::try_from).collect()
    }

    async fn get_version(&self, id: &MessageId) -> Result<Option<VersionStamp>, StorageError> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT version, observed_at FROM version_stamps WHERE message_id = ?1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(VersionStamp::try_from).transpose()
    }

    async fn put_version(
        &self,
        id: &MessageId,
        stamp: &VersionStamp,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        upsert_version(&mut conn, id, stamp).await
    }
}

#[async_trait]
impl StoreBackend for SqliteStore {
    async fn commit_page(&self, plan: &PagePlan) -> Result<CommitOutcome, StorageError> {
        let mut outcome = CommitOutcome::default();
        let mut landed: Vec<&ClientMsgId> = Vec::new();

        let mut tx = self.pool.begin().await?;

        for message in &plan.messages {
            if insert_message_if_absent(&mut tx, message).await? {
                outcome.inserted += 1;
            } else if select_message(&mut tx, &message.channel_id, &message.id)
                .await?
                .is_some()
            {
                outcome.duplicates += 1;
            } else {
                tracing::warn!(
                    channel = %plan.channel_id,
                    message = %message.id,
                    seq = %message.seq,
                    "seq already held by another message; skipping"
                );
                outcome.seq_conflicts += 1;
                continue;
            }
            if let Some(client_msg_id) = &message.client_msg_id {
                landed.push(client_msg_id);
            }
        }

        let new_max = to_db("max_seq", plan.new_max().value())?;

        sqlx::query(
            r#"
            INSERT INTO sync_cursors (channel_id, max_seq) VALUES (?1, ?2)
            ON CONFLICT(channel_id) DO UPDATE SET max_seq = MAX(max_seq, excluded.max_seq)
            "#,
        )
        .bind(plan.channel_id.as_str())
        .bind(new_max)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO channels (id, max_seq) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET max_seq = MAX(max_seq, excluded.max_seq)
            "#,
        )
        .bind(plan.channel_id.as_str())
        .bind(new_max)
        .execute(&mut *tx)
        .await?;

        for client_msg_id in landed {
            let removed_outbox = delete_outbox(&mut tx, client_msg_id).await?;
            let removed_local = delete_local(&mut tx, client_msg_id).await?;
            if removed_outbox || removed_local {
                outcome.confirmed.push(client_msg_id.clone());
            }
        }

        tx.commit().await?;

        tracing::debug!(
            channel = %plan.channel_id,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            confirmed = outcome.confirmed.len(),
            max_seq = %plan.new_max(),
            "committed page"
        );
        Ok(outcome)
    }

    async fn commit_send(
        &self,
        entry: &OutboxEntry,
        local: &LocalMessage,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        insert_outbox(&mut tx, entry).await?;
        upsert_local(&mut tx, local).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_outbox_update(
        &self,
        id: &ClientMsgId,
        update: &OutboxUpdate,
    ) -> Result<Option<OutboxEntry>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let Some(entry) = update_outbox_row(&mut tx, id, update).await? else {
            return Ok(None);
        };

        let local = match select_local(&mut tx, id).await? {
            Some(existing) => mirror_into(&existing, &entry),
            None => LocalMessage::mirror(&entry),
        };
        upsert_local(&mut tx, &local).await?;

        tx.commit().await?;
        Ok(Some(entry))
    }

    async fn commit_cancel(&self, id: &ClientMsgId) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;
        let removed_outbox = delete_outbox(&mut tx, id).await?;
        let removed_local = delete_local(&mut tx, id).await?;
        tx.commit().await?;
        Ok(removed_outbox || removed_local)
    }

    async fn commit_mutation(
        &self,
        message: &Message,
        stamp: &VersionStamp,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE messages
            SET content = ?1, reactions = ?2, edited_at = ?3, deleted = ?4
            WHERE channel_id = ?5 AND id = ?6
            "#,
        )
        .bind(encode_value(&message.content)?)
        .bind(encode_value(&message.reactions)?)
        .bind(message.edited_at)
        .bind(message.deleted)
        .bind(message.channel_id.as_str())
        .bind(message.id.as_str())
        .execute(&mut *tx)
        .await?;
        upsert_version(&mut tx, &message.id, stamp).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn count_outbox(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "messages",
            "sync_cursors",
            "channels",
            "outbox",
            "local_messages",
            "version_stamps",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!("cleared message store");
        Ok(())
    }

    async fn delete_store(&self) -> Result<(), StorageError> {
        self.pool.close().await;

        if let Some(path) = &self.path {
            let mut targets = vec![path.clone()];
            for suffix in ["-wal", "-shm"] {
                let mut name = path.clone().into_os_string();
                name.push(suffix);
                targets.push(PathBuf::from(name));
            }
            for target in targets {
                match tokio::fs::remove_file(&target).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            tracing::info!(path = %path.display(), "deleted message store");
        }
        Ok(())
    }
}

const MESSAGE_COLUMNS: &str =
    "channel_id, id, seq, client_msg_id, content, reactions, created_at, edited_at, deleted";

async fn select_message(
    conn: &mut SqliteConnection,
    channel_id: &ChannelId,
    id: &MessageId,
) -> Result<Option<Message>, StorageError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE channel_id = ?1 AND id = ?2"
    ))
    .bind(channel_id.as_str())
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Message::try_from).transpose()
}

/// Insert a message unless its id or seq is already taken. Returns whether it was written.
async fn insert_message_if_absent(
    conn: &mut SqliteConnection,
    message: &Message,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        r#"
        INSERT INTO messages
            (channel_id, id, seq, client_msg_id, content, reactions, created_at, edited_at, deleted)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(message.channel_id.as_str())
    .bind(message.id.as_str())
    .bind(to_db("seq", message.seq.value())?)
    .bind(message.client_msg_id.as_ref().map(|id| id.as_str()))
    .bind(encode_value(&message.content)?)
    .bind(encode_value(&message.reactions)?)
    .bind(message.created_at)
    .bind(message.edited_at)
    .bind(message.deleted)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn insert_outbox(conn: &mut SqliteConnection, entry: &OutboxEntry) -> Result<(), StorageError> {
    let result = sqlx::query(
        r#"
        INSERT INTO outbox (client_msg_id, channel_id, payload, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(entry.client_msg_id.as_str())
    .bind(entry.channel_id.as_str())
    .bind(encode_value(&entry.payload)?)
    .bind(entry.status.as_str())
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(StorageError::DuplicateOutboxEntry {
                client_msg_id: entry.client_msg_id.clone(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

async fn select_outbox(
    conn: &mut SqliteConnection,
    id: &ClientMsgId,
) -> Result<Option<OutboxEntry>, StorageError> {
    let row = sqlx::query_as::<_, OutboxRow>(
        r#"
        SELECT client_msg_id, channel_id, payload, status, created_at, updated_at
        FROM outbox
        WHERE client_msg_id = ?1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(OutboxEntry::try_from).transpose()
}

/// Read-modify-write of one outbox row. The caller owns the transaction.
async fn update_outbox_row(
    conn: &mut SqliteConnection,
    id: &ClientMsgId,
    update: &OutboxUpdate,
) -> Result<Option<OutboxEntry>, StorageError> {
    let Some(entry) = select_outbox(conn, id).await? else {
        return Ok(None);
    };

    let next = apply_update(&entry, update, now_millis()).map_err(|source| {
        StorageError::InvalidTransition {
            client_msg_id: id.clone(),
            source,
        }
    })?;
    if next == entry {
        return Ok(Some(entry));
    }

    sqlx::query(
        r#"
        UPDATE outbox SET payload = ?1, status = ?2, updated_at = ?3
        WHERE client_msg_id = ?4
        "#,
    )
    .bind(encode_value(&next.payload)?)
    .bind(next.status.as_str())
    .bind(next.updated_at)
    .bind(id.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(Some(next))
}

async fn delete_outbox(conn: &mut SqliteConnection, id: &ClientMsgId) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM outbox WHERE client_msg_id = ?1")
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn upsert_local(conn: &mut SqliteConnection, local: &LocalMessage) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO local_messages (client_msg_id, channel_id, content, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(client_msg_id) DO UPDATE SET
            channel_id = excluded.channel_id,
            content = excluded.content,
            status = excluded.status,
            created_at = excluded.created_at
        "#,
    )
    .bind(local.client_msg_id.as_str())
    .bind(local.channel_id.as_str())
    .bind(encode_value(&local.content)?)
    .bind(local.status.as_str())
    .bind(local.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn select_local(
    conn: &mut SqliteConnection,
    id: &ClientMsgId,
) -> Result<Option<LocalMessage>, StorageError> {
    let row = sqlx::query_as::<_, LocalRow>(
        r#"
        SELECT client_msg_id, channel_id, content, status, created_at
        FROM local_messages
        WHERE client_msg_id = ?1
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(LocalMessage::try_from).transpose()
}

async fn delete_local(conn: &mut SqliteConnection, id: &ClientMsgId) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM local_messages WHERE client_msg_id = ?1")
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn upsert_version(
    conn: &mut SqliteConnection,
    id: &MessageId,
    stamp: &VersionStamp,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO version_stamps (message_id, version, observed_at) VALUES (?1, ?2, ?3)
        ON CONFLICT(message_id) DO UPDATE
        SET version = excluded.version, observed_at = excluded.observed_at
        "#,
    )
    .bind(id.as_str())
    .bind(to_db("version", stamp.version.value())?)
    .bind(stamp.observed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn encode_value(value: &Value) -> Result<Vec<u8>, StorageError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

fn decode_value(bytes: &[u8]) -> Result<Value, StorageError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// SQLite integers are signed; refuse values that would wrap.
fn to_db(field: &'static str, value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::OutOfRange { field, value })
}

fn from_db(field: &'static str, value: i64) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::Corrupt(format!("negative {field}: {value}")))
}

fn parse_status(raw: &str) -> Result<OutboxStatus, StorageError> {
    raw.parse()
        .map_err(|e: sync_types::TypeError| StorageError::Corrupt(e.to_string()))
}

/// Internal row types for SQLite queries.
#[derive(sqlx::FromRow)]
struct MessageRow {
    channel_id: String,
    id: String,
    seq: i64,
    client_msg_id: Option<String>,
    content: Vec<u8>,
    reactions: Vec<u8>,
    created_at: i64,
    edited_at: Option<i64>,
    deleted: bool,
}

impl TryFrom<MessageRow> for Message {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::new(row.id),
            channel_id: ChannelId::new(row.channel_id),
            seq: Seq::new(from_db("seq", row.seq)?),
            client_msg_id: row.client_msg_id.map(ClientMsgId::new),
            content: decode_value(&row.content)?,
            reactions: decode_value(&row.reactions)?,
            created_at: row.created_at,
            edited_at: row.edited_at,
            deleted: row.deleted,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CursorRow {
    channel_id: String,
    max_seq: i64,
    sync_state: Option<Vec<u8>>,
}

impl TryFrom<CursorRow> for SyncCursor {
    type Error = StorageError;

    fn try_from(row: CursorRow) -> Result<Self, Self::Error> {
        let sync_state = row
            .sync_state
            .as_deref()
            .map(rmp_serde::from_slice::<SyncState>)
            .transpose()?;

        Ok(SyncCursor {
            channel_id: ChannelId::new(row.channel_id),
            max_seq: Seq::new(from_db("max_seq", row.max_seq)?),
            sync_state,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: String,
    max_seq: i64,
}

impl TryFrom<ChannelRow> for ChannelMeta {
    type Error = StorageError;

    fn try_from(row: ChannelRow) -> Result<Self, Self::Error> {
        Ok(ChannelMeta {
            id: ChannelId::new(row.id),
            max_seq: Seq::new(from_db("max_seq", row.max_seq)?),
        })
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    client_msg_id: String,
    channel_id: String,
    payload: Vec<u8>,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = StorageError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        Ok(OutboxEntry {
            client_msg_id: ClientMsgId::new(row.client_msg_id),
            channel_id: ChannelId::new(row.channel_id),
            payload: decode_value(&row.payload)?,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LocalRow {
    client_msg_id: String,
    channel_id: String,
    content: Vec<u8>,
    status: String,
    created_at: i64,
}

impl TryFrom<LocalRow> for LocalMessage {
    type Error = StorageError;

    fn try_from(row: LocalRow) -> Result<Self, Self::Error> {
        Ok(LocalMessage {
            client_msg_id: ClientMsgId::new(row.client_msg_id),
            channel_id: ChannelId::new(row.channel_id),
            content: decode_value(&row.content)?,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    version: i64,
    observed_at: i64,
}

impl TryFrom<VersionRow> for VersionStamp {
    type Error = StorageError;

    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        Ok(VersionStamp {
            version: Version::new(from_db("version", row.version)?),
            observed_at: row.observed_at,
        })
    }
}
