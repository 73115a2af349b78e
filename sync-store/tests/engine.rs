//! Engine behaviour against both storage backends.
//!
//! Every scenario is written once, generic over a [`Harness`], and
//! instantiated for the in-memory and the SQLite backend by
//! `for_each_backend!` at the bottom of the file.

use chatsync_store::config::Config;
use chatsync_store::{
    EngineError, MemoryStore, MutationOutcome, OfflineStorage, PageRequest, SqliteStore,
    StorageError, StoreBackend, SyncEngine,
};
use serde_json::json;
use sync_core::{CursorUpdate, ViewItem};
use sync_types::{
    ChannelId, ClientMsgId, LocalMessage, Message, MessageId, MessagePatch, OutboxStatus,
    OutboxUpdate, Seq, Version,
};

trait Harness {
    type Store: StoreBackend;

    async fn engine(config: Config) -> SyncEngine<Self::Store>;
}

struct Memory;

impl Harness for Memory {
    type Store = MemoryStore;

    async fn engine(config: Config) -> SyncEngine<MemoryStore> {
        SyncEngine::new(MemoryStore::new(), config)
    }
}

struct Sqlite;

impl Harness for Sqlite {
    type Store = SqliteStore;

    async fn engine(config: Config) -> SyncEngine<SqliteStore> {
        let store = SqliteStore::in_memory().await.expect("in-memory sqlite");
        SyncEngine::new(store, config)
    }
}

fn msg(channel: &str, id: &str, seq: u64) -> Message {
    Message::new(channel, id, Seq::new(seq), json!({"text": id}))
}

fn c1() -> ChannelId {
    ChannelId::from("c1")
}

fn seqs(messages: &[Message]) -> Vec<u64> {
    messages.iter().map(|m| m.seq.value()).collect()
}

// ============================================================================
// Cursors and page application
// ============================================================================

/// Cursor at 10, the same page [11, 12] applied twice: cursor 12, two rows.
async fn replayed_page_is_idempotent<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    engine.set_max_seq(&c1(), Seq::new(10)).await.unwrap();

    let page = vec![msg("c1", "m11", 11), msg("c1", "m12", 12)];

    let first = engine
        .apply_incoming_messages(&c1(), page.clone())
        .await
        .unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(first.previous_max, Seq::new(10));
    assert_eq!(first.new_max, Seq::new(12));

    let second = engine.apply_incoming_messages(&c1(), page).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(second.new_max, Seq::new(12));

    assert_eq!(engine.get_max_seq(&c1()).await.unwrap(), Seq::new(12));
    let stored = engine
        .get_messages(&c1(), PageRequest::since(Seq::zero()))
        .await
        .unwrap();
    assert_eq!(seqs(&stored), vec![11, 12]);
}

async fn cursor_never_moves_backwards<H: Harness>() {
    let engine = H::engine(Config::default()).await;

    let update = engine.set_max_seq(&c1(), Seq::new(20)).await.unwrap();
    assert!(update.is_advanced());

    let err = engine.set_max_seq(&c1(), Seq::new(5)).await.unwrap_err();
    assert!(err.is_guard_violation());
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::CursorRegression { .. })
    ));
    assert_eq!(engine.get_max_seq(&c1()).await.unwrap(), Seq::new(20));

    let same = engine.set_max_seq(&c1(), Seq::new(20)).await.unwrap();
    assert_eq!(same, CursorUpdate::Unchanged(Seq::new(20)));

    // A back-filled history page is stored without dragging the cursor down.
    let history = engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "old", 3)])
        .await
        .unwrap();
    assert_eq!(history.inserted, 1);
    assert_eq!(history.new_max, Seq::new(20));
    assert_eq!(engine.get_max_seq(&c1()).await.unwrap(), Seq::new(20));

    engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "new", 25)])
        .await
        .unwrap();
    assert_eq!(engine.get_max_seq(&c1()).await.unwrap(), Seq::new(25));
}

async fn mismatched_page_writes_nothing<H: Harness>() {
    let engine = H::engine(Config::default()).await;

    let err = engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "a", 1), msg("c2", "b", 2)])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Page(_)));
    assert!(err.is_guard_violation());

    assert_eq!(engine.get_max_seq(&c1()).await.unwrap(), Seq::zero());
    assert!(engine
        .get_message(&c1(), &MessageId::from("a"))
        .await
        .unwrap()
        .is_none());
    assert!(engine.list_channels().await.unwrap().is_empty());
}

async fn concurrent_pages_for_one_channel<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let channel = c1();

    let page = |from: u64| -> Vec<Message> {
        (from..from + 5)
            .map(|seq| msg("c1", &format!("m{seq}"), seq))
            .collect()
    };

    let (a, b, c, d) = tokio::join!(
        engine.apply_incoming_messages(&channel, page(16)),
        engine.apply_incoming_messages(&channel, page(1)),
        engine.apply_incoming_messages(&channel, page(11)),
        engine.apply_incoming_messages(&channel, page(6)),
    );
    for report in [a, b, c, d] {
        assert_eq!(report.unwrap().inserted, 5);
    }

    assert_eq!(engine.get_max_seq(&channel).await.unwrap(), Seq::new(20));
    let stored = engine
        .get_messages(&channel, PageRequest::since(Seq::zero()))
        .await
        .unwrap();
    assert_eq!(seqs(&stored), (1..=20).collect::<Vec<_>>());
}

async fn channels_are_listed_and_compared<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let c2 = ChannelId::from("c2");

    engine
        .apply_incoming_messages(&c2, vec![msg("c2", "b", 7)])
        .await
        .unwrap();
    engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "a", 5)])
        .await
        .unwrap();

    let channels = engine.list_channels().await.unwrap();
    let listed: Vec<(&str, u64)> = channels
        .iter()
        .map(|c| (c.id.as_str(), c.max_seq.value()))
        .collect();
    assert_eq!(listed, vec![("c1", 5), ("c2", 7)]);

    assert!(!engine.needs_sync(&c1(), Seq::new(5)).await.unwrap());
    assert!(engine.needs_sync(&c1(), Seq::new(6)).await.unwrap());
    assert!(!engine
        .needs_sync(&ChannelId::from("fresh"), Seq::zero())
        .await
        .unwrap());
}

// ============================================================================
// Range reads and the merged view
// ============================================================================

async fn range_scan_is_exact<H: Harness>() {
    let engine = H::engine(Config::default()).await;

    let mut page: Vec<Message> = (1..=10).map(|s| msg("c1", &format!("m{s}"), s)).collect();
    page.reverse();
    engine.apply_incoming_messages(&c1(), page).await.unwrap();
    engine
        .apply_incoming_messages(&ChannelId::from("c2"), vec![msg("c2", "other", 4)])
        .await
        .unwrap();

    let window = engine
        .get_messages(&c1(), PageRequest::since(Seq::new(3)).with_limit(4))
        .await
        .unwrap();
    assert_eq!(seqs(&window), vec![4, 5, 6, 7]);

    let tail = engine
        .get_messages(&c1(), PageRequest::since(Seq::new(10)))
        .await
        .unwrap();
    assert!(tail.is_empty());

    let all = engine
        .get_messages(&c1(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 10);

    let unknown = engine
        .get_messages(&ChannelId::from("nope"), PageRequest::default())
        .await
        .unwrap();
    assert!(unknown.is_empty());

    let beyond = engine
        .get_messages(&c1(), PageRequest::since(Seq::new(u64::MAX)))
        .await
        .unwrap();
    assert!(beyond.is_empty());
}

async fn merged_view_orders_confirmed_then_pending<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "m1", 1), msg("c1", "m2", 2)])
        .await
        .unwrap();

    let a = engine.enqueue_send(&c1(), json!({"text": "a"})).await.unwrap();

    let view = engine.get_merged_view(&c1()).await.unwrap();
    assert_eq!(view.len(), 3);
    assert!(matches!(&view[0], ViewItem::Confirmed(m) if m.id.as_str() == "m1"));
    assert!(matches!(&view[1], ViewItem::Confirmed(m) if m.id.as_str() == "m2"));
    assert!(matches!(&view[2], ViewItem::Pending(l) if l.client_msg_id == a));

    let b = engine.enqueue_send(&c1(), json!({"text": "b"})).await.unwrap();
    let echo = msg("c1", "m3", 3).with_client_msg_id(a.clone());
    engine.apply_incoming_messages(&c1(), vec![echo]).await.unwrap();

    let view = engine.get_merged_view(&c1()).await.unwrap();
    assert_eq!(view.len(), 4);
    assert!(matches!(&view[2], ViewItem::Confirmed(m) if m.client_msg_id.as_ref() == Some(&a)));
    assert!(matches!(&view[3], ViewItem::Pending(l) if l.client_msg_id == b));

    let other = engine
        .get_merged_view(&ChannelId::from("c2"))
        .await
        .unwrap();
    assert!(other.is_empty());
}

// ============================================================================
// Outbox and overlay
// ============================================================================

/// enqueueSend("c1", {text: "hi"}), then the echo m1/seq 13 confirms it.
async fn confirmed_echo_replaces_local_send<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    engine.set_max_seq(&c1(), Seq::new(12)).await.unwrap();

    let id = engine
        .enqueue_send(&c1(), json!({"text": "hi"}))
        .await
        .unwrap();

    let entry = engine.get_outbox(&id).await.unwrap().unwrap();
    assert_eq!(entry.status, OutboxStatus::Queued);
    assert_eq!(entry.payload, json!({"text": "hi"}));
    let local = engine.get_local(&id).await.unwrap().unwrap();
    assert_eq!(local.status, OutboxStatus::Queued);
    assert_eq!(local.content, json!({"text": "hi"}));

    let echo = Message::new("c1", "m1", Seq::new(13), json!({"text": "hi"}))
        .with_client_msg_id(id.clone());
    let report = engine
        .apply_incoming_messages(&c1(), vec![echo])
        .await
        .unwrap();
    assert_eq!(report.confirmed, vec![id.clone()]);

    assert!(engine.get_outbox(&id).await.unwrap().is_none());
    assert!(engine.get_local(&id).await.unwrap().is_none());
    assert!(engine.list_pending_outbox().await.unwrap().is_empty());

    let page = engine
        .get_messages(&c1(), PageRequest::since(Seq::new(12)).with_limit(1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, MessageId::from("m1"));

    let by_client = engine.get_message_by_client_id(&id).await.unwrap();
    assert_eq!(by_client.map(|m| m.id), Some(MessageId::from("m1")));
}

async fn overlay_mirrors_outbox<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let id = engine.enqueue_send(&c1(), json!({"text": "hi"})).await.unwrap();

    for (step, expected) in [
        ("sending", OutboxStatus::Sending),
        ("failed", OutboxStatus::Failed),
        ("queued", OutboxStatus::Queued),
    ] {
        let entry = match step {
            "sending" => engine.mark_sending(&id).await,
            "failed" => engine.mark_failed(&id).await,
            _ => engine.retry_send(&id).await,
        }
        .unwrap()
        .unwrap();
        assert_eq!(entry.status, expected);

        let local = engine.get_local(&id).await.unwrap().unwrap();
        assert_eq!(local.status, expected, "overlay out of step after {step}");
    }

    let edited = engine
        .update_outbox(&id, OutboxUpdate::payload(json!({"text": "edited"})))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edited.payload, json!({"text": "edited"}));
    let local = engine.get_local(&id).await.unwrap().unwrap();
    assert_eq!(local.content, json!({"text": "edited"}));

    assert!(engine.cancel_send(&id).await.unwrap());
    assert!(engine.get_outbox(&id).await.unwrap().is_none());
    assert!(engine.get_local(&id).await.unwrap().is_none());
}

async fn sent_then_failed_is_allowed<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let id = engine.enqueue_send(&c1(), json!({"text": "hi"})).await.unwrap();

    engine.mark_sending(&id).await.unwrap();
    engine.mark_sent(&id).await.unwrap();
    let entry = engine.mark_failed(&id).await.unwrap().unwrap();

    assert_eq!(entry.status, OutboxStatus::Failed);
}

async fn illegal_transition_is_rejected<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let id = engine.enqueue_send(&c1(), json!({"text": "hi"})).await.unwrap();

    let err = engine.mark_sent(&id).await.unwrap_err();
    assert!(err.is_guard_violation());
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::InvalidTransition { .. })
    ));

    let entry = engine.get_outbox(&id).await.unwrap().unwrap();
    assert_eq!(entry.status, OutboxStatus::Queued);
    let local = engine.get_local(&id).await.unwrap().unwrap();
    assert_eq!(local.status, OutboxStatus::Queued);
}

async fn gone_entries_are_benign<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let id = engine.enqueue_send(&c1(), json!({"text": "hi"})).await.unwrap();

    assert!(engine.cancel_send(&id).await.unwrap());
    assert!(!engine.cancel_send(&id).await.unwrap());
    assert!(engine.mark_sending(&id).await.unwrap().is_none());
    assert!(engine.get_local(&id).await.unwrap().is_none());

    let ghost = ClientMsgId::from("never-queued");
    assert!(engine
        .update_outbox(&ghost, OutboxUpdate::status(OutboxStatus::Failed))
        .await
        .unwrap()
        .is_none());
}

async fn duplicate_client_id_is_rejected<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let id = ClientMsgId::from("x");

    engine
        .enqueue_send_with_id(&c1(), id.clone(), json!({"text": "one"}))
        .await
        .unwrap();
    let err = engine
        .enqueue_send_with_id(&c1(), id.clone(), json!({"text": "two"}))
        .await
        .unwrap_err();
    assert!(err.is_guard_violation());
    assert!(matches!(
        err,
        EngineError::Storage(StorageError::DuplicateOutboxEntry { .. })
    ));

    let pending = engine.list_pending_outbox().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, json!({"text": "one"}));
}

async fn outbox_capacity_is_enforced<H: Harness>() {
    let mut config = Config::default();
    config.outbox.max_pending = 2;
    let engine = H::engine(config).await;

    let first = engine.enqueue_send(&c1(), json!(1)).await.unwrap();
    engine.enqueue_send(&c1(), json!(2)).await.unwrap();

    let err = engine.enqueue_send(&c1(), json!(3)).await.unwrap_err();
    assert!(matches!(err, EngineError::OutboxFull { capacity: 2 }));
    assert_eq!(engine.list_pending_outbox().await.unwrap().len(), 2);

    let echo = msg("c1", "m1", 1).with_client_msg_id(first);
    engine.apply_incoming_messages(&c1(), vec![echo]).await.unwrap();

    engine.enqueue_send(&c1(), json!(3)).await.unwrap();
    assert_eq!(engine.list_pending_outbox().await.unwrap().len(), 2);
}

async fn recover_repairs_overlay<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let a = engine.enqueue_send(&c1(), json!({"text": "a"})).await.unwrap();
    let b = engine.enqueue_send(&c1(), json!({"text": "b"})).await.unwrap();

    // Overlay lost for `a`, an orphan overlay with no outbox entry.
    engine.store().remove_local(&a).await.unwrap();
    let orphan = LocalMessage {
        client_msg_id: ClientMsgId::from("orphan"),
        channel_id: c1(),
        content: json!(null),
        status: OutboxStatus::Failed,
        created_at: 0,
    };
    engine.store().put_local(&orphan).await.unwrap();

    // An outbox entry whose echo is already cached.
    engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "m9", 9).with_client_msg_id("late")])
        .await
        .unwrap();
    let late = sync_core::outbox::new_entry(ClientMsgId::from("late"), c1(), json!(null), 1);
    engine.store().add_outbox(&late).await.unwrap();

    let report = engine.recover().await.unwrap();
    assert_eq!(report.overlays_restored, 1);
    assert_eq!(report.overlays_dropped, 1);
    assert_eq!(report.superseded, 1);

    let pending: Vec<ClientMsgId> = report.pending.into_iter().map(|e| e.client_msg_id).collect();
    assert_eq!(pending.len(), 2);
    assert!(pending.contains(&a) && pending.contains(&b));

    assert!(engine.get_local(&a).await.unwrap().is_some());
    assert!(engine
        .get_local(&ClientMsgId::from("orphan"))
        .await
        .unwrap()
        .is_none());
    assert!(engine
        .get_outbox(&ClientMsgId::from("late"))
        .await
        .unwrap()
        .is_none());
}

// ============================================================================
// Mutation events
// ============================================================================

async fn stale_events_are_dropped<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let m1 = MessageId::from("m1");
    engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "m1", 1)])
        .await
        .unwrap();

    let edit = |text: &str, at: i64| MessagePatch::Edit {
        content: json!({"text": text}),
        edited_at: at,
    };

    let applied = engine
        .apply_mutation_event(&m1, Version::new(2), &edit("v2", 2))
        .await
        .unwrap();
    match applied {
        MutationOutcome::Applied { message: m } => {
            assert_eq!(m.content, json!({"text": "v2"}))
        }
        other => panic!("expected applied edit, got {other:?}"),
    }

    let late = engine
        .apply_mutation_event(&m1, Version::new(1), &edit("v1", 1))
        .await
        .unwrap();
    assert_eq!(
        late,
        MutationOutcome::Stale {
            stored: Version::new(2)
        }
    );

    let replay = engine
        .apply_mutation_event(&m1, Version::new(2), &edit("v2", 2))
        .await
        .unwrap();
    assert!(!replay.is_applied());

    let reactions = MessagePatch::Reactions {
        reactions: json!({"👍": ["u1"]}),
    };
    assert!(engine
        .apply_mutation_event(&m1, Version::new(3), &reactions)
        .await
        .unwrap()
        .is_applied());

    let stored = engine.get_message(&c1(), &m1).await.unwrap().unwrap();
    assert_eq!(stored.content, json!({"text": "v2"}));
    assert_eq!(stored.reactions, json!({"👍": ["u1"]}));
    assert_eq!(stored.edited_at, Some(2));

    engine
        .apply_mutation_event(&m1, Version::new(4), &MessagePatch::Delete)
        .await
        .unwrap();
    let stored = engine.get_message(&c1(), &m1).await.unwrap().unwrap();
    assert!(stored.deleted);
    assert_eq!(stored.content, json!(null));
    assert_eq!(stored.seq, Seq::new(1));
}

/// An edit that outruns its message is not lost: nothing is stamped, and the
/// redelivered edit applies once the message has landed.
async fn early_edit_applies_after_message_lands<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    let m1 = MessageId::from("m1");
    let edit = MessagePatch::Edit {
        content: json!({"text": "edited"}),
        edited_at: 9,
    };

    let early = engine
        .apply_mutation_event(&m1, Version::new(2), &edit)
        .await
        .unwrap();
    assert_eq!(early, MutationOutcome::NotCached);
    assert!(!early.is_applied());
    assert!(engine.store().get_version(&m1).await.unwrap().is_none());

    engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "m1", 1)])
        .await
        .unwrap();

    let redelivered = engine
        .apply_mutation_event(&m1, Version::new(2), &edit)
        .await
        .unwrap();
    assert!(redelivered.is_applied());

    let stored = engine.get_message(&c1(), &m1).await.unwrap().unwrap();
    assert_eq!(stored.content, json!({"text": "edited"}));
    assert_eq!(stored.edited_at, Some(9));

    let stamp = engine.store().get_version(&m1).await.unwrap().unwrap();
    assert_eq!(stamp.version, Version::new(2));
}

// ============================================================================
// Lifecycle
// ============================================================================

async fn clear_all_empties_every_family<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "m1", 1)])
        .await
        .unwrap();
    engine.enqueue_send(&c1(), json!({"text": "hi"})).await.unwrap();
    engine
        .apply_mutation_event(&MessageId::from("m1"), Version::new(1), &MessagePatch::Delete)
        .await
        .unwrap();

    engine.clear_all().await.unwrap();

    assert!(engine.list_channels().await.unwrap().is_empty());
    assert_eq!(engine.get_max_seq(&c1()).await.unwrap(), Seq::zero());
    assert!(engine.list_pending_outbox().await.unwrap().is_empty());
    assert!(engine.get_merged_view(&c1()).await.unwrap().is_empty());
    assert!(engine
        .store()
        .get_version(&MessageId::from("m1"))
        .await
        .unwrap()
        .is_none());

    // Still usable afterwards.
    engine
        .apply_incoming_messages(&c1(), vec![msg("c1", "m1", 1)])
        .await
        .unwrap();
    assert_eq!(engine.get_max_seq(&c1()).await.unwrap(), Seq::new(1));
}

async fn deleted_store_is_unavailable<H: Harness>() {
    let engine = H::engine(Config::default()).await;
    engine.enqueue_send(&c1(), json!({"text": "hi"})).await.unwrap();

    engine.delete_store().await.unwrap();

    let err = engine.get_max_seq(&c1()).await.unwrap_err();
    assert!(err.is_unavailable());
    let err = engine.enqueue_send(&c1(), json!(null)).await.unwrap_err();
    assert!(err.is_unavailable());
}

macro_rules! for_each_backend {
    ($($scenario:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario::<super::Memory>().await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $scenario() {
                    super::$scenario::<super::Sqlite>().await;
                }
            )*
        }
    };
}

for_each_backend!(
    replayed_page_is_idempotent,
    cursor_never_moves_backwards,
    mismatched_page_writes_nothing,
    concurrent_pages_for_one_channel,
    channels_are_listed_and_compared,
    range_scan_is_exact,
    merged_view_orders_confirmed_then_pending,
    confirmed_echo_replaces_local_send,
    overlay_mirrors_outbox,
    sent_then_failed_is_allowed,
    illegal_transition_is_rejected,
    gone_entries_are_benign,
    duplicate_client_id_is_rejected,
    outbox_capacity_is_enforced,
    recover_repairs_overlay,
    stale_events_are_dropped,
    early_edit_applies_after_message_lands,
    clear_all_empties_every_family,
    deleted_store_is_unavailable,
);

// ============================================================================
// On-disk store
// ============================================================================

#[tokio::test]
async fn outbox_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.db");

    let id = {
        let engine = SyncEngine::new(SqliteStore::new(&path).await.unwrap(), Config::default());
        engine
            .apply_incoming_messages(&c1(), vec![msg("c1", "m1", 1)])
            .await
            .unwrap();
        let id = engine.enqueue_send(&c1(), json!({"text": "hi"})).await.unwrap();
        engine.mark_sending(&id).await.unwrap();
        id
    };

    let engine = SyncEngine::new(SqliteStore::new(&path).await.unwrap(), Config::default());
    let report = engine.recover().await.unwrap();

    assert_eq!(report.pending.len(), 1);
    assert_eq!(report.pending[0].client_msg_id, id);
    assert_eq!(report.pending[0].status, OutboxStatus::Sending);
    assert_eq!(engine.get_max_seq(&c1()).await.unwrap(), Seq::new(1));
    assert!(engine.get_local(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_store_removes_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.db");
    let engine = SyncEngine::new(SqliteStore::new(&path).await.unwrap(), Config::default());
    engine.enqueue_send(&c1(), json!({"text": "hi"})).await.unwrap();
    assert!(path.exists());

    engine.delete_store().await.unwrap();

    assert!(!path.exists());
    assert!(engine.list_pending_outbox().await.unwrap_err().is_unavailable());
}
