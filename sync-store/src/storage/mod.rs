//! Storage layer for chatsync.
//!
//! Two traits split the store by concern: [`SyncStorage`] covers the
//! confirmed cache (messages, cursors, channel bookkeeping), and
//! [`OfflineStorage`] covers what only exists on this device (outbox,
//! optimistic overlay, version stamps). [`StoreBackend`] adds the combined
//! writes the engine needs to be atomic across record families.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StorageError;
use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};
use sync_core::PagePlan;
use sync_types::{
    ChannelId, ChannelMeta, ClientMsgId, LocalMessage, Message, MessageId, OutboxEntry,
    OutboxStatus, OutboxUpdate, Seq, SyncCursor, VersionStamp,
};

/// Result of committing one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Messages written for the first time.
    pub inserted: usize,
    /// Messages already cached under the same id (left untouched).
    pub duplicates: usize,
    /// Messages refused because another id already holds their seq.
    pub seq_conflicts: usize,
    /// Local sends whose outbox and overlay entries were removed.
    pub confirmed: Vec<ClientMsgId>,
}

/// Confirmed message cache and per-channel cursors.
#[async_trait]
pub trait SyncStorage: Send + Sync {
    /// Get a cached message by channel and id.
    async fn get_message(
        &self,
        channel_id: &ChannelId,
        id: &MessageId,
    ) -> Result<Option<Message>, StorageError>;

    /// Get a cached message by id alone.
    async fn find_message(&self, id: &MessageId) -> Result<Option<Message>, StorageError>;

    /// Get the confirmed message that echoes a local send.
    async fn get_message_by_client_id(
        &self,
        client_msg_id: &ClientMsgId,
    ) -> Result<Option<Message>, StorageError>;

    /// Get messages with seq strictly greater than `after`.
    ///
    /// Returns up to `limit` messages, ordered by seq.
    async fn get_messages_after(
        &self,
        channel_id: &ChannelId,
        after: Seq,
        limit: u32,
    ) -> Result<Vec<Message>, StorageError>;

    /// Get the cursor for a channel, if one was ever written.
    async fn get_cursor(&self, channel_id: &ChannelId)
        -> Result<Option<SyncCursor>, StorageError>;

    /// Write a cursor and the matching channel bookkeeping.
    ///
    /// This is a blind upsert; monotonicity is checked by the caller.
    async fn put_cursor(&self, cursor: &SyncCursor) -> Result<(), StorageError>;

    /// Get channel bookkeeping.
    async fn get_channel(&self, channel_id: &ChannelId)
        -> Result<Option<ChannelMeta>, StorageError>;

    /// List every known channel, ordered by id.
    async fn list_channels(&self) -> Result<Vec<ChannelMeta>, StorageError>;
}

/// Device-local records: outbox, optimistic overlay and version stamps.
#[async_trait]
pub trait OfflineStorage: Send + Sync {
    /// Insert a new outbox entry.
    ///
    /// Fails with [`StorageError::DuplicateOutboxEntry`] if the key exists.
    async fn add_outbox(&self, entry: &OutboxEntry) -> Result<(), StorageError>;

    /// Get an outbox entry.
    async fn get_outbox(&self, id: &ClientMsgId) -> Result<Option<OutboxEntry>, StorageError>;

    /// Apply a partial update to an outbox entry.
    ///
    /// Returns `None` when the entry no longer exists.
    async fn update_outbox(
        &self,
        id: &ClientMsgId,
        update: &OutboxUpdate,
    ) -> Result<Option<OutboxEntry>, StorageError>;

    /// Remove an outbox entry. Returns whether it existed.
    async fn remove_outbox(&self, id: &ClientMsgId) -> Result<bool, StorageError>;

    /// List outbox entries ordered by creation time.
    async fn list_outbox(&self) -> Result<Vec<OutboxEntry>, StorageError>;

    /// Insert or replace an overlay entry.
    async fn put_local(&self, local: &LocalMessage) -> Result<(), StorageError>;

    /// Get an overlay entry.
    async fn get_local(&self, id: &ClientMsgId) -> Result<Option<LocalMessage>, StorageError>;

    /// Set an overlay entry's status. Returns `None` when it no longer exists.
    async fn update_local_status(
        &self,
        id: &ClientMsgId,
        status: OutboxStatus,
    ) -> Result<Option<LocalMessage>, StorageError>;

    /// Remove an overlay entry. Returns whether it existed.
    async fn remove_local(&self, id: &ClientMsgId) -> Result<bool, StorageError>;

    /// List overlay entries, optionally for one channel, ordered by creation time.
    async fn list_local(
        &self,
        channel_id: Option<&ChannelId>,
    ) -> Result<Vec<LocalMessage>, StorageError>;

    /// Get the version stamp for a message.
    async fn get_version(&self, id: &MessageId) -> Result<Option<VersionStamp>, StorageError>;

    /// Write the version stamp for a message.
    async fn put_version(&self, id: &MessageId, stamp: &VersionStamp)
        -> Result<(), StorageError>;
}

/// A complete store: both record groups plus the cross-family writes.
///
/// Every `commit_*` method is all-or-nothing.
#[async_trait]
pub trait StoreBackend: SyncStorage + OfflineStorage {
    /// Persist a validated page.
    ///
    /// Inserts absent messages, raises the cursor to `plan.new_max()` (never
    /// lowering a stored value) and drops outbox and overlay entries for
    /// sends the page confirms.
    async fn commit_page(&self, plan: &PagePlan) -> Result<CommitOutcome, StorageError>;

    /// Insert an outbox entry and its overlay mirror together.
    async fn commit_send(
        &self,
        entry: &OutboxEntry,
        local: &LocalMessage,
    ) -> Result<(), StorageError>;

    /// Update an outbox entry and mirror the result into the overlay.
    ///
    /// A missing overlay entry is recreated. Returns `None` when the outbox
    /// entry no longer exists.
    async fn commit_outbox_update(
        &self,
        id: &ClientMsgId,
        update: &OutboxUpdate,
    ) -> Result<Option<OutboxEntry>, StorageError>;

    /// Remove an outbox entry and its overlay mirror. Returns whether either existed.
    async fn commit_cancel(&self, id: &ClientMsgId) -> Result<bool, StorageError>;

    /// Write a patched message and its new version stamp together.
    async fn commit_mutation(
        &self,
        message: &Message,
        stamp: &VersionStamp,
    ) -> Result<(), StorageError>;

    /// Number of outbox entries.
    async fn count_outbox(&self) -> Result<usize, StorageError>;

    /// Remove every record from every family. The store stays usable.
    async fn clear_all(&self) -> Result<(), StorageError>;

    /// Close the store and remove its durable files.
    ///
    /// Later operations fail with an unavailable error.
    async fn delete_store(&self) -> Result<(), StorageError>;
}

/// Current time in unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
