//! SyncEngine - the main interface for chatsync.
//!
//! [`SyncEngine`] sits between the transport (which talks to the server) and
//! the UI (which renders channels). It owns no network code: the transport
//! hands it pages and mutation events, and asks it what still has to be sent.
//!
//! # Architecture
//!
//! ```text
//! Transport ─┐                     ┌─ sync-core (pure decisions)
//!            ├─► SyncEngine ───────┤
//! UI ────────┘                     └─ StoreBackend (SQLite / memory)
//! ```
//!
//! Writes that advance a channel's cursor are serialized per channel;
//! mutation events are serialized per message. Everything else runs
//! concurrently.
//!
//! # Example
//!
//! ```ignore
//! use chatsync_store::{MemoryStore, SyncEngine, PageRequest};
//!
//! let engine = SyncEngine::new(MemoryStore::new(), Config::default());
//! let id = engine.enqueue_send(&"c1".into(), json!({"text": "hi"})).await?;
//! engine.apply_incoming_messages(&"c1".into(), page).await?;
//! let view = engine.get_merged_view(&"c1".into()).await?;
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use sync_core::{
    apply_patch, decide, merge_view, plan_page, CursorTracker, CursorUpdate, Decision, ViewItem,
};
use sync_types::{
    ChannelId, ChannelMeta, ClientMsgId, LocalMessage, Message, MessageId, MessagePatch,
    OutboxEntry, OutboxStatus, OutboxUpdate, Seq, SyncCursor, SyncState, Version, VersionStamp,
};

use crate::config::Config;
use crate::error::{EngineError, EngineResult, StorageError};
use crate::locks::KeyedLocks;
use crate::storage::{now_millis, StoreBackend};

/// Range read parameters for [`SyncEngine::get_messages`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Only messages with a seq strictly greater than this.
    pub since_seq: Seq,
    /// Page size; the configured default when `None`.
    pub limit: Option<u32>,
}

impl PageRequest {
    /// Messages after `since_seq` with the default page size.
    pub fn since(since_seq: Seq) -> Self {
        Self {
            since_seq,
            limit: None,
        }
    }

    /// Set the page size.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// What applying one page did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Channel the page was applied to.
    pub channel_id: ChannelId,
    /// Messages stored for the first time.
    pub inserted: usize,
    /// Messages already cached (replays, overlapping pages).
    pub duplicates: usize,
    /// Messages skipped because their seq is held by another id.
    pub seq_conflicts: usize,
    /// Cursor before the page.
    pub previous_max: Seq,
    /// Cursor after the page.
    pub new_max: Seq,
    /// Local sends this page confirmed.
    pub confirmed: Vec<ClientMsgId>,
}

/// Result of a mutation event.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The event was newer than anything seen; the patch and stamp were written.
    Applied {
        /// The patched message.
        message: Message,
    },
    /// The message is not cached yet. Nothing was written, so the transport
    /// can deliver the event again once the message has landed.
    NotCached,
    /// The event was a replay or arrived late and was dropped.
    Stale {
        /// Version already applied.
        stored: Version,
    },
}

impl MutationOutcome {
    /// Whether the event was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied { .. })
    }
}

/// What [`SyncEngine::recover`] repaired.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    /// Outbox entries the transport should resume, oldest first.
    pub pending: Vec<OutboxEntry>,
    /// Overlay entries recreated from their outbox entry.
    pub overlays_restored: usize,
    /// Overlay entries removed because nothing backs them.
    pub overlays_dropped: usize,
    /// Sends whose confirmed copy was already stored.
    pub superseded: usize,
}

/// Offline-first message cache for one account on one device.
pub struct SyncEngine<S: StoreBackend> {
    store: Arc<S>,
    config: Config,
    channel_locks: KeyedLocks<ChannelId>,
    message_locks: KeyedLocks<MessageId>,
    send_lock: Mutex<()>,
}

impl<S: StoreBackend> SyncEngine<S> {
    /// Create an engine over a store.
    pub fn new(store: S, config: Config) -> Self {
        Self::with_shared(Arc::new(store), config)
    }

    /// Create an engine over a store that other components also hold.
    pub fn with_shared(store: Arc<S>, config: Config) -> Self {
        Self {
            store,
            config,
            channel_locks: KeyedLocks::new(),
            message_locks: KeyedLocks::new(),
            send_lock: Mutex::new(()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ===== Cursors =====

    /// Highest seq applied for a channel (0 if the channel is unknown).
    pub async fn get_max_seq(&self, channel_id: &ChannelId) -> EngineResult<Seq> {
        Ok(self
            .store
            .get_cursor(channel_id)
            .await?
            .map(|c| c.max_seq)
            .unwrap_or_default())
    }

    /// Explicitly move a channel's cursor.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CursorRegression`] if `seq` is below the
    /// stored value. The stored cursor is left untouched.
    pub async fn set_max_seq(&self, channel_id: &ChannelId, seq: Seq) -> EngineResult<CursorUpdate> {
        let update = {
            let _guard = self.channel_locks.lock(channel_id).await;
            self.set_max_seq_locked(channel_id, seq).await
        };
        self.channel_locks.prune();
        update
    }

    async fn set_max_seq_locked(
        &self,
        channel_id: &ChannelId,
        seq: Seq,
    ) -> EngineResult<CursorUpdate> {
        let mut cursor = self
            .store
            .get_cursor(channel_id)
            .await?
            .unwrap_or_else(|| SyncCursor::new(channel_id.clone()));

        let update = CursorTracker::with_seq(cursor.max_seq).plan_set(seq);
        match update {
            CursorUpdate::Rejected { current, requested } => {
                tracing::warn!(
                    channel = %channel_id,
                    %current,
                    %requested,
                    "refused to move cursor backwards"
                );
                return Err(StorageError::CursorRegression {
                    channel_id: channel_id.clone(),
                    current,
                    requested,
                }
                .into());
            }
            CursorUpdate::Advanced { to, .. } => {
                cursor.max_seq = to;
                self.store.put_cursor(&cursor).await?;
            }
            CursorUpdate::Unchanged(_) => {}
        }

        Ok(update)
    }

    /// Opaque resume metadata for a channel.
    pub async fn get_sync_state(&self, channel_id: &ChannelId) -> EngineResult<Option<SyncState>> {
        Ok(self
            .store
            .get_cursor(channel_id)
            .await?
            .and_then(|c| c.sync_state))
    }

    /// Replace a channel's resume metadata. The cursor value is kept.
    pub async fn set_sync_state(&self, channel_id: &ChannelId, state: SyncState) -> EngineResult<()> {
        let result = {
            let _guard = self.channel_locks.lock(channel_id).await;
            self.set_sync_state_locked(channel_id, state).await
        };
        self.channel_locks.prune();
        result
    }

    async fn set_sync_state_locked(
        &self,
        channel_id: &ChannelId,
        state: SyncState,
    ) -> EngineResult<()> {
        let mut cursor = self
            .store
            .get_cursor(channel_id)
            .await?
            .unwrap_or_else(|| SyncCursor::new(channel_id.clone()));
        cursor.sync_state = Some(state);
        self.store.put_cursor(&cursor).await?;
        Ok(())
    }

    /// Whether the server holds messages this device has not applied.
    pub async fn needs_sync(&self, channel_id: &ChannelId, server_max: Seq) -> EngineResult<bool> {
        let current = self.get_max_seq(channel_id).await?;
        Ok(CursorTracker::with_seq(current).needs_sync(server_max))
    }

    /// Every channel the device has applied at least one page for.
    pub async fn list_channels(&self) -> EngineResult<Vec<ChannelMeta>> {
        Ok(self.store.list_channels().await?)
    }

    // ===== Transport-facing =====

    /// Persist a page of confirmed messages and advance the cursor.
    ///
    /// Idempotent: applying the same page again stores nothing new and leaves
    /// the cursor where it was. Local sends echoed by the page are removed
    /// from the outbox and the overlay in the same transaction.
    pub async fn apply_incoming_messages(
        &self,
        channel_id: &ChannelId,
        messages: Vec<Message>,
    ) -> EngineResult<ApplyReport> {
        let report = {
            let _guard = self.channel_locks.lock(channel_id).await;
            self.apply_page_locked(channel_id, messages).await
        };
        self.channel_locks.prune();
        report
    }

    async fn apply_page_locked(
        &self,
        channel_id: &ChannelId,
        messages: Vec<Message>,
    ) -> EngineResult<ApplyReport> {
        let previous_max = self.get_max_seq(channel_id).await?;
        let plan = plan_page(channel_id, previous_max, messages).map_err(|e| {
            tracing::warn!(channel = %channel_id, error = %e, "rejected page");
            EngineError::from(e)
        })?;
        let outcome = self.store.commit_page(&plan).await?;

        let report = ApplyReport {
            channel_id: channel_id.clone(),
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
            seq_conflicts: outcome.seq_conflicts,
            previous_max,
            new_max: plan.new_max(),
            confirmed: outcome.confirmed,
        };

        tracing::debug!(
            channel = %channel_id,
            inserted = report.inserted,
            duplicates = report.duplicates,
            from = %report.previous_max,
            to = %report.new_max,
            "applied page"
        );
        Ok(report)
    }

    /// Apply an edit, reaction or delete event if it is newer than what is stored.
    ///
    /// Stale events are dropped and reported as [`MutationOutcome::Stale`],
    /// never as an error. Events for a message that is not cached leave no
    /// trace and come back as [`MutationOutcome::NotCached`].
    pub async fn apply_mutation_event(
        &self,
        message_id: &MessageId,
        version: Version,
        patch: &MessagePatch,
    ) -> EngineResult<MutationOutcome> {
        let outcome = {
            let _guard = self.message_locks.lock(message_id).await;
            self.apply_mutation_locked(message_id, version, patch).await
        };
        self.message_locks.prune();
        outcome
    }

    async fn apply_mutation_locked(
        &self,
        message_id: &MessageId,
        version: Version,
        patch: &MessagePatch,
    ) -> EngineResult<MutationOutcome> {
        let stored = self.store.get_version(message_id).await?;

        if let Decision::Stale { stored } = decide(stored.as_ref(), version) {
            tracing::warn!(
                message = %message_id,
                incoming = %version,
                %stored,
                "dropped stale mutation event"
            );
            return Ok(MutationOutcome::Stale { stored });
        }

        let Some(mut message) = self.store.find_message(message_id).await? else {
            tracing::debug!(
                message = %message_id,
                incoming = %version,
                "mutation event for uncached message"
            );
            return Ok(MutationOutcome::NotCached);
        };
        apply_patch(&mut message, patch);

        let stamp = VersionStamp {
            version,
            observed_at: now_millis(),
        };
        self.store.commit_mutation(&message, &stamp).await?;

        tracing::debug!(message = %message_id, %version, "applied mutation event");
        Ok(MutationOutcome::Applied { message })
    }

    /// Every unconfirmed send, oldest first.
    pub async fn list_pending_outbox(&self) -> EngineResult<Vec<OutboxEntry>> {
        Ok(self.store.list_outbox().await?)
    }

    /// Repair the outbox and overlay after a restart.
    ///
    /// Recreates overlay entries missing for an outbox entry, drops overlay
    /// entries with no outbox entry behind them, and clears sends whose
    /// confirmed copy is already cached. Returns what is left to send.
    pub async fn recover(&self) -> EngineResult<RecoveryReport> {
        let _send = self.send_lock.lock().await;
        let mut report = RecoveryReport::default();

        for entry in self.store.list_outbox().await? {
            let id = &entry.client_msg_id;
            if self.store.get_message_by_client_id(id).await?.is_some() {
                self.store.commit_cancel(id).await?;
                report.superseded += 1;
            } else if self.store.get_local(id).await?.is_none() {
                self.store.put_local(&LocalMessage::mirror(&entry)).await?;
                report.overlays_restored += 1;
            }
        }

        for local in self.store.list_local(None).await? {
            if self.store.get_outbox(&local.client_msg_id).await?.is_none() {
                self.store.remove_local(&local.client_msg_id).await?;
                report.overlays_dropped += 1;
            }
        }

        report.pending = self.store.list_outbox().await?;

        tracing::info!(
            pending = report.pending.len(),
            restored = report.overlays_restored,
            dropped = report.overlays_dropped,
            superseded = report.superseded,
            "recovered outbox"
        );
        Ok(report)
    }

    // ===== Send lifecycle =====

    /// The transport picked the entry up.
    pub async fn mark_sending(&self, id: &ClientMsgId) -> EngineResult<Option<OutboxEntry>> {
        self.update_outbox(id, OutboxUpdate::status(OutboxStatus::Sending))
            .await
    }

    /// The server accepted the send; the confirmed echo is still to come.
    pub async fn mark_sent(&self, id: &ClientMsgId) -> EngineResult<Option<OutboxEntry>> {
        self.update_outbox(id, OutboxUpdate::status(OutboxStatus::Sent))
            .await
    }

    /// The transport gave up on the send.
    pub async fn mark_failed(&self, id: &ClientMsgId) -> EngineResult<Option<OutboxEntry>> {
        self.update_outbox(id, OutboxUpdate::status(OutboxStatus::Failed))
            .await
    }

    /// Queue a failed send again under the same client id.
    pub async fn retry_send(&self, id: &ClientMsgId) -> EngineResult<Option<OutboxEntry>> {
        self.update_outbox(id, OutboxUpdate::status(OutboxStatus::Queued))
            .await
    }

    /// Apply a partial update to an outbox entry and mirror it into the overlay.
    ///
    /// Returns `Ok(None)` if the entry is already gone (confirmed or cancelled).
    pub async fn update_outbox(
        &self,
        id: &ClientMsgId,
        update: OutboxUpdate,
    ) -> EngineResult<Option<OutboxEntry>> {
        match self.store.commit_outbox_update(id, &update).await {
            Ok(Some(entry)) => {
                tracing::debug!(client_msg_id = %id, status = %entry.status, "updated outbox entry");
                Ok(Some(entry))
            }
            Ok(None) => {
                tracing::debug!(client_msg_id = %id, "outbox entry already gone");
                Ok(None)
            }
            Err(e) => {
                if e.is_guard_violation() {
                    tracing::warn!(client_msg_id = %id, error = %e, "rejected outbox update");
                }
                Err(e.into())
            }
        }
    }

    /// Discard an unconfirmed send. Returns whether anything was removed.
    pub async fn cancel_send(&self, id: &ClientMsgId) -> EngineResult<bool> {
        Ok(self.store.commit_cancel(id).await?)
    }

    /// Look up an outbox entry.
    pub async fn get_outbox(&self, id: &ClientMsgId) -> EngineResult<Option<OutboxEntry>> {
        Ok(self.store.get_outbox(id).await?)
    }

    /// Look up an overlay entry.
    pub async fn get_local(&self, id: &ClientMsgId) -> EngineResult<Option<LocalMessage>> {
        Ok(self.store.get_local(id).await?)
    }

    // ===== UI-facing =====

    /// Confirmed messages after `since_seq`, ascending by seq.
    pub async fn get_messages(
        &self,
        channel_id: &ChannelId,
        request: PageRequest,
    ) -> EngineResult<Vec<Message>> {
        let limit = self.config.sync.resolve_limit(request.limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .store
            .get_messages_after(channel_id, request.since_seq, limit)
            .await?)
    }

    /// A single confirmed message.
    pub async fn get_message(
        &self,
        channel_id: &ChannelId,
        id: &MessageId,
    ) -> EngineResult<Option<Message>> {
        Ok(self.store.get_message(channel_id, id).await?)
    }

    /// The confirmed copy of a local send, once it has arrived.
    pub async fn get_message_by_client_id(
        &self,
        client_msg_id: &ClientMsgId,
    ) -> EngineResult<Option<Message>> {
        Ok(self.store.get_message_by_client_id(client_msg_id).await?)
    }

    /// Confirmed messages by seq, followed by pending local sends.
    pub async fn get_merged_view(&self, channel_id: &ChannelId) -> EngineResult<Vec<ViewItem>> {
        let page_size = self.config.sync.max_page_limit.max(1);
        let mut confirmed = Vec::new();
        let mut since = Seq::zero();

        loop {
            let page = self
                .store
                .get_messages_after(channel_id, since, page_size)
                .await?;
            let full = page.len() == page_size as usize;
            if let Some(last) = page.last() {
                since = last.seq;
            }
            confirmed.extend(page);
            if !full {
                break;
            }
        }

        let pending = self.store.list_local(Some(channel_id)).await?;
        Ok(merge_view(confirmed, pending))
    }

    /// Queue a message for sending and show it optimistically.
    ///
    /// Returns the freshly minted idempotency id.
    pub async fn enqueue_send(&self, channel_id: &ChannelId, payload: Value) -> EngineResult<ClientMsgId> {
        let entry = self
            .enqueue_send_with_id(channel_id, ClientMsgId::generate(), payload)
            .await?;
        Ok(entry.client_msg_id)
    }

    /// Queue a message under a caller-supplied idempotency id.
    ///
    /// # Errors
    ///
    /// - [`StorageError::DuplicateOutboxEntry`] if the id is already queued.
    /// - [`EngineError::OutboxFull`] if the configured capacity is reached.
    pub async fn enqueue_send_with_id(
        &self,
        channel_id: &ChannelId,
        client_msg_id: ClientMsgId,
        payload: Value,
    ) -> EngineResult<OutboxEntry> {
        let _send = self.send_lock.lock().await;

        let capacity = self.config.outbox.max_pending;
        if capacity > 0 && self.store.count_outbox().await? >= capacity {
            tracing::warn!(capacity, "outbox full, refusing send");
            return Err(EngineError::OutboxFull { capacity });
        }

        let entry =
            sync_core::outbox::new_entry(client_msg_id, channel_id.clone(), payload, now_millis());
        let local = LocalMessage::mirror(&entry);

        if let Err(e) = self.store.commit_send(&entry, &local).await {
            if e.is_guard_violation() {
                tracing::warn!(client_msg_id = %entry.client_msg_id, error = %e, "rejected send");
            }
            return Err(e.into());
        }

        tracing::debug!(
            channel = %channel_id,
            client_msg_id = %entry.client_msg_id,
            "queued send"
        );
        Ok(entry)
    }

    /// Remove every cached record. The store stays open.
    pub async fn clear_all(&self) -> EngineResult<()> {
        let _send = self.send_lock.lock().await;
        self.store.clear_all().await?;
        tracing::info!("cleared all cached records");
        Ok(())
    }

    /// Close the store and delete it from the device.
    pub async fn delete_store(&self) -> EngineResult<()> {
        let _send = self.send_lock.lock().await;
        self.store.delete_store().await?;
        tracing::info!("deleted store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn engine() -> SyncEngine<MemoryStore> {
        SyncEngine::new(MemoryStore::new(), Config::default())
    }

    #[tokio::test]
    async fn unknown_channel_has_zero_cursor() {
        let engine = engine();
        let max = engine.get_max_seq(&ChannelId::from("nope")).await.unwrap();
        assert_eq!(max, Seq::zero());
    }

    #[tokio::test]
    async fn sync_state_survives_cursor_moves() {
        let engine = engine();
        let c1 = ChannelId::from("c1");
        let state = SyncState {
            page_token: Some("abc".into()),
            ..SyncState::default()
        };
        engine.set_sync_state(&c1, state.clone()).await.unwrap();
        engine.set_max_seq(&c1, Seq::new(5)).await.unwrap();

        assert_eq!(engine.get_sync_state(&c1).await.unwrap(), Some(state));
        assert_eq!(engine.get_max_seq(&c1).await.unwrap(), Seq::new(5));
    }

    #[tokio::test]
    async fn zero_limit_reads_nothing() {
        let engine = engine();
        let c1 = ChannelId::from("c1");
        engine
            .apply_incoming_messages(&c1, vec![Message::new("c1", "a", Seq::new(1), json!(null))])
            .await
            .unwrap();

        let page = engine
            .get_messages(&c1, PageRequest::since(Seq::zero()).with_limit(0))
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn merged_view_pages_through_long_channels() {
        let mut config = Config::default();
        config.sync.max_page_limit = 2;
        let engine = SyncEngine::new(MemoryStore::new(), config);
        let c1 = ChannelId::from("c1");

        let page: Vec<Message> = (1..=5)
            .map(|seq| Message::new("c1", format!("m{seq}"), Seq::new(seq), json!(null)))
            .collect();
        engine.apply_incoming_messages(&c1, page).await.unwrap();

        let view = engine.get_merged_view(&c1).await.unwrap();
        assert_eq!(view.len(), 5);
    }

    #[tokio::test]
    async fn mutation_locks_are_pruned() {
        let engine = engine();
        engine
            .apply_mutation_event(&MessageId::from("m1"), Version::new(1), &MessagePatch::Delete)
            .await
            .unwrap();
        assert!(engine.message_locks.is_empty());
    }

    #[tokio::test]
    async fn channel_locks_are_pruned() {
        let engine = engine();
        for name in ["c1", "c2", "c3"] {
            let channel = ChannelId::from(name);
            engine
                .apply_incoming_messages(
                    &channel,
                    vec![Message::new(name, format!("{name}-m1"), Seq::new(1), json!(null))],
                )
                .await
                .unwrap();
            engine.set_max_seq(&channel, Seq::new(2)).await.unwrap();
            engine
                .set_sync_state(&channel, SyncState::default())
                .await
                .unwrap();
        }

        assert!(engine.set_max_seq(&ChannelId::from("c1"), Seq::new(1)).await.is_err());
        assert!(engine.channel_locks.is_empty());
    }
}
