//! In-memory storage backend.
//!
//! Behaves like [`SqliteStore`](super::SqliteStore) without touching disk.
//! Used by tests and by hosts that only need a session-lifetime cache.
//! Every `commit_*` runs under a single lock, so it is all-or-nothing.

use super::{now_millis, CommitOutcome, OfflineStorage, StoreBackend, SyncStorage};
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};
use sync_core::{apply_update, mirror_into, PagePlan};
use sync_types::{
    ChannelId, ChannelMeta, ClientMsgId, LocalMessage, Message, MessageId, OutboxEntry,
    OutboxStatus, OutboxUpdate, Seq, SyncCursor, VersionStamp,
};

/// In-memory message cache.
///
/// Clones share the same state.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    destroyed: bool,
    fail_next_write: Option<String>,
    messages: HashMap<(ChannelId, MessageId), Message>,
    by_seq: BTreeMap<(ChannelId, Seq), MessageId>,
    by_id: HashMap<MessageId, ChannelId>,
    by_client: HashMap<ClientMsgId, (ChannelId, MessageId)>,
    cursors: HashMap<ChannelId, SyncCursor>,
    channels: BTreeMap<ChannelId, ChannelMeta>,
    outbox: HashMap<ClientMsgId, OutboxEntry>,
    local: HashMap<ClientMsgId, LocalMessage>,
    versions: HashMap<MessageId, VersionStamp>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next write to fail as if the device store were unavailable.
    pub fn fail_next_write(&self, error: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_next_write = Some(error.to_string());
        }
    }

    fn read(&self) -> Result<MutexGuard<'_, MemoryInner>, StorageError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        if inner.destroyed {
            return Err(StorageError::Unavailable("store has been deleted".into()));
        }
        Ok(inner)
    }

    fn write(&self) -> Result<MutexGuard<'_, MemoryInner>, StorageError> {
        let mut inner = self.read()?;
        if let Some(error) = inner.fail_next_write.take() {
            return Err(StorageError::Unavailable(error));
        }
        Ok(inner)
    }
}

impl MemoryInner {
    fn raise_cursor(&mut self, channel_id: &ChannelId, max_seq: Seq) {
        let cursor = self
            .cursors
            .entry(channel_id.clone())
            .or_insert_with(|| SyncCursor::new(channel_id.clone()));
        cursor.max_seq = cursor.max_seq.max(max_seq);

        let meta = self
            .channels
            .entry(channel_id.clone())
            .or_insert_with(|| ChannelMeta {
                id: channel_id.clone(),
                max_seq: Seq::zero(),
            });
        meta.max_seq = meta.max_seq.max(max_seq);
    }

    fn update_outbox(
        &mut self,
        id: &ClientMsgId,
        update: &OutboxUpdate,
    ) -> Result<Option<OutboxEntry>, StorageError> {
        let Some(entry) = self.outbox.get(id) else {
            return Ok(None);
        };
        let next = apply_update(entry, update, now_millis()).map_err(|source| {
            StorageError::InvalidTransition {
                client_msg_id: id.clone(),
                source,
            }
        })?;
        self.outbox.insert(id.clone(), next.clone());
        Ok(Some(next))
    }
}

fn sorted_by_creation<T>(mut items: Vec<T>, key: impl Fn(&T) -> (i64, &ClientMsgId)) -> Vec<T> {
    items.sort_by(|a, b| key(a).cmp(&key(b)));
    items
}

#[async_trait]
impl SyncStorage for MemoryStore {
    async fn get_message(
        &self,
        channel_id: &ChannelId,
        id: &MessageId,
    ) -> Result<Option<Message>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .messages
            .get(&(channel_id.clone(), id.clone()))
            .cloned())
    }

    async fn find_message(&self, id: &MessageId) -> Result<Option<Message>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .by_id
            .get(id)
            .and_then(|channel_id| inner.messages.get(&(channel_id.clone(), id.clone())))
            .cloned())
    }

    async fn get_message_by_client_id(
        &self,
        client_msg_id: &ClientMsgId,
    ) -> Result<Option<Message>, StorageError> {
        let inner = self.read()?;
        Ok(inner
            .by_client
            .get(client_msg_id)
            .and_then(|key| inner.messages.get(key))
            .cloned())
    }

    async fn get_messages_after(
        &self,
        channel_id: &ChannelId,
        after: Seq,
        limit: u32,
    ) -> Result<Vec<Message>, StorageError> {
        let inner = self.read()?;
        let range = (
            Bound::Excluded((channel_id.clone(), after)),
            Bound::Included((channel_id.clone(), Seq::new(u64::MAX))),
        );

        Ok(inner
            .by_seq
            .range(range)
            .take(limit as usize)
            .filter_map(|((channel, _), id)| inner.messages.get(&(channel.clone(), id.clone())))
            .cloned()
            .collect())
    }

    async fn get_cursor(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<SyncCursor>, StorageError> {
        Ok(self.read()?.cursors.get(channel_id).cloned())
    }

    async fn put_cursor(&self, cursor: &SyncCursor) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        inner
            .cursors
            .insert(cursor.channel_id.clone(), cursor.clone());
        inner.channels.insert(
            cursor.channel_id.clone(),
            ChannelMeta {
                id: cursor.channel_id.clone(),
                max_seq: cursor.max_seq,
            },
        );
        Ok(())
    }

    async fn get_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<ChannelMeta>, StorageError> {
        Ok(self.read()?.channels.get(channel_id).cloned())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelMeta>, StorageError> {
        Ok(self.read()?.channels.values().cloned().collect())
    }
}

#[async_trait]
impl OfflineStorage for MemoryStore {
    async fn add_outbox(&self, entry: &OutboxEntry) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        if inner.outbox.contains_key(&entry.client_msg_id) {
            return Err(StorageError::DuplicateOutboxEntry {
                client_msg_id: entry.client_msg_id.clone(),
            });
        }
        inner
            .outbox
            .insert(entry.client_msg_id.clone(), entry.clone());
        Ok(())
    }

    async fn get_outbox(&self, id: &ClientMsgId) -> Result<Option<OutboxEntry>, StorageError> {
        Ok(self.read()?.outbox.get(id).cloned())
    }

    async fn update_outbox(
        &self,
        id: &ClientMsgId,
        update: &OutboxUpdate,
    ) -> Result<Option<OutboxEntry>, StorageError> {
        self.write()?.update_outbox(id, update)
    }

    async fn remove_outbox(&self, id: &ClientMsgId) -> Result<bool, StorageError> {
        Ok(self.write()?.outbox.remove(id).is_some())
    }

    async fn list_outbox(&self) -> Result<Vec<OutboxEntry>, StorageError> {
        let entries: Vec<OutboxEntry> = self.read()?.outbox.values().cloned().collect();
        Ok(sorted_by_creation(entries, |e| (e.created_at, &e.client_msg_id)))
    }

    async fn put_local(&self, local: &LocalMessage) -> Result<(), StorageError> {
        self.write()?
            .local
            .insert(local.client_msg_id.clone(), local.clone());
        Ok(())
    }

    async fn get_local(&self, id: &ClientMsgId) -> Result<Option<LocalMessage>, StorageError> {
        Ok(self.read()?.local.get(id).cloned())
    }

    async fn update_local_status(
        &self,
        id: &ClientMsgId,
        status: OutboxStatus,
    ) -> Result<Option<LocalMessage>, StorageError> {
        let mut inner = self.write()?;
        Ok(inner.local.get_mut(id).map(|local| {
            local.status = status;
            local.clone()
        }))
    }

    async fn remove_local(&self, id: &ClientMsgId) -> Result<bool, StorageError> {
        Ok(self.write()?.local.remove(id).is_some())
    }

    async fn list_local(
        &self,
        channel_id: Option<&ChannelId>,
    ) -> Result<Vec<LocalMessage>, StorageError> {
        let entries: Vec<LocalMessage> = self
            .read()?
            .local
            .values()
            .filter(|l| channel_id.map_or(true, |c| &l.channel_id == c))
            .cloned()
            .collect();
        Ok(sorted_by_creation(entries, |l| (l.created_at, &l.client_msg_id)))
    }

    async fn get_version(&self, id: &MessageId) -> Result<Option<VersionStamp>, StorageError> {
        Ok(self.read()?.versions.get(id).copied())
    }

    async fn put_version(
        &self,
        id: &MessageId,
        stamp: &VersionStamp,
    ) -> Result<(), StorageError> {
        self.write()?.versions.insert(id.clone(), *stamp);
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn commit_page(&self, plan: &PagePlan) -> Result<CommitOutcome, StorageError> {
        let mut inner = self.write()?;
        let mut outcome = CommitOutcome::default();
        let mut landed = Vec::new();

        for message in &plan.messages {
            let key = (message.channel_id.clone(), message.id.clone());
            let seq_key = (message.channel_id.clone(), message.seq);

            if inner.messages.contains_key(&key) {
                outcome.duplicates += 1;
            } else if inner.by_seq.contains_key(&seq_key) {
                tracing::warn!(
                    channel = %plan.channel_id,
                    message = %message.id,
                    seq = %message.seq,
                    "seq already held by another message; skipping"
                );
                outcome.seq_conflicts += 1;
                continue;
            } else {
                inner.by_seq.insert(seq_key, message.id.clone());
                inner
                    .by_id
                    .entry(message.id.clone())
                    .or_insert_with(|| message.channel_id.clone());
                if let Some(client_msg_id) = &message.client_msg_id {
                    inner
                        .by_client
                        .entry(client_msg_id.clone())
                        .or_insert_with(|| key.clone());
                }
                inner.messages.insert(key, message.clone());
                outcome.inserted += 1;
            }
            if let Some(client_msg_id) = &message.client_msg_id {
                landed.push(client_msg_id.clone());
            }
        }

        inner.raise_cursor(&plan.channel_id, plan.new_max());

        for client_msg_id in landed {
            let removed_outbox = inner.outbox.remove(&client_msg_id).is_some();
            let removed_local = inner.local.remove(&client_msg_id).is_some();
            if removed_outbox || removed_local {
                outcome.confirmed.push(client_msg_id);
            }
        }

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
        let mut inner = self.write()?;
        if inner.outbox.contains_key(&entry.client_msg_id) {
            return Err(StorageError::DuplicateOutboxEntry {
                client_msg_id: entry.client_msg_id.clone(),
            });
        }
        inner
            .outbox
            .insert(entry.client_msg_id.clone(), entry.clone());
        inner
            .local
            .insert(local.client_msg_id.clone(), local.clone());
        Ok(())
    }

    async fn commit_outbox_update(
        &self,
        id: &ClientMsgId,
        update: &OutboxUpdate,
    ) -> Result<Option<OutboxEntry>, StorageError> {
        let mut inner = self.write()?;
        let Some(entry) = inner.update_outbox(id, update)? else {
            return Ok(None);
        };

        let local = match inner.local.get(id) {
            Some(existing) => mirror_into(existing, &entry),
            None => LocalMessage::mirror(&entry),
        };
        inner.local.insert(id.clone(), local);
        Ok(Some(entry))
    }

    async fn commit_cancel(&self, id: &ClientMsgId) -> Result<bool, StorageError> {
        let mut inner = self.write()?;
        let removed_outbox = inner.outbox.remove(id).is_some();
        let removed_local = inner.local.remove(id).is_some();
        Ok(removed_outbox || removed_local)
    }

    async fn commit_mutation(
        &self,
        message: &Message,
        stamp: &VersionStamp,
    ) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        let key = (message.channel_id.clone(), message.id.clone());
        if let Some(cached) = inner.messages.get_mut(&key) {
            cached.content = message.content.clone();
            cached.reactions = message.reactions.clone();
            cached.edited_at = message.edited_at;
            cached.deleted = message.deleted;
        }
        inner.versions.insert(message.id.clone(), *stamp);
        Ok(())
    }

    async fn count_outbox(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.outbox.len())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        inner.messages.clear();
        inner.by_seq.clear();
        inner.by_id.clear();
        inner.by_client.clear();
        inner.cursors.clear();
        inner.channels.clear();
        inner.outbox.clear();
        inner.local.clear();
        inner.versions.clear();
        Ok(())
    }

    async fn delete_store(&self) -> Result<(), StorageError> {
        let mut inner = self.write()?;
        *inner = MemoryInner {
            destroyed: true,
            ..MemoryInner::default()
        };
        Ok(())
    }
}
