//! Record families persisted by the chatsync store.
//!
//! There are six of them: confirmed [`Message`]s, per-channel
//! [`SyncCursor`]s, [`OutboxEntry`]s for sends in flight, optimistic
//! [`LocalMessage`]s rendered by the UI, [`ChannelMeta`] bookkeeping, and
//! [`VersionStamp`]s guarding mutable message facets.
//!
//! Content, payloads and reactions are opaque JSON values; the store never
//! interprets them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::{ChannelId, ClientMsgId, MessageId, Seq, TypeError, Version};

/// A confirmed, server-assigned message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server message id (unique across channels).
    pub id: MessageId,
    /// Channel the message belongs to.
    pub channel_id: ChannelId,
    /// Server-assigned per-channel sequence number.
    pub seq: Seq,
    /// Present only when this message originated from a local send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<ClientMsgId>,
    /// Opaque message content.
    #[serde(default)]
    pub content: Value,
    /// Opaque reaction state, replaced wholesale by reaction events.
    #[serde(default)]
    pub reactions: Value,
    /// Server creation time (unix millis).
    #[serde(default)]
    pub created_at: i64,
    /// Time of the last applied edit (unix millis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
    /// Tombstone flag set by delete events.
    #[serde(default)]
    pub deleted: bool,
}

impl Message {
    /// Create a message with empty reactions and no edit history.
    pub fn new(
        channel_id: impl Into<ChannelId>,
        id: impl Into<MessageId>,
        seq: Seq,
        content: Value,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            seq,
            client_msg_id: None,
            content,
            reactions: Value::Null,
            created_at: 0,
            edited_at: None,
            deleted: false,
        }
    }

    /// Attach the client id this message confirms.
    pub fn with_client_msg_id(mut self, id: impl Into<ClientMsgId>) -> Self {
        self.client_msg_id = Some(id.into());
        self
    }

    /// Set the server creation time.
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Opaque resume metadata for incremental pulls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// When the last successful pull finished (unix millis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<i64>,
    /// Server pagination token to resume from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    /// Anything else the transport wants to remember.
    #[serde(default)]
    pub extra: Value,
}

/// Per-channel sync cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Channel this cursor tracks.
    pub channel_id: ChannelId,
    /// Highest seq durably applied. Never decreases.
    pub max_seq: Seq,
    /// Resume metadata, absent until the transport first records some.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_state: Option<SyncState>,
}

impl SyncCursor {
    /// A fresh cursor at seq 0 with no state.
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            max_seq: Seq::zero(),
            sync_state: None,
        }
    }
}

/// Minimal per-channel bookkeeping, addressed by plain channel id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMeta {
    /// Channel id.
    pub id: ChannelId,
    /// Highest seq durably applied.
    pub max_seq: Seq,
}

/// Lifecycle status of an outgoing message.
///
/// Legal transitions: `queued → sending → {sent | failed}`, `sent → failed`
/// when the confirmation never arrives, and `failed → queued` on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Waiting for the transport to pick it up.
    Queued,
    /// Handed to the network.
    Sending,
    /// Server accepted the call; waiting for the confirmed echo.
    Sent,
    /// Gave up; the UI may offer retry or discard.
    Failed,
}

impl OutboxStatus {
    /// Lowercase name used in storage and on the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Queued => "queued",
            OutboxStatus::Sending => "sending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(OutboxStatus::Queued),
            "sending" => Ok(OutboxStatus::Sending),
            "sent" => Ok(OutboxStatus::Sent),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

/// A client-originated message not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Idempotency token, reused on every retry.
    pub client_msg_id: ClientMsgId,
    /// Destination channel.
    pub channel_id: ChannelId,
    /// Opaque payload handed to the transport.
    pub payload: Value,
    /// Current lifecycle status.
    pub status: OutboxStatus,
    /// When the send was enqueued (unix millis).
    pub created_at: i64,
    /// Last status or payload change (unix millis).
    pub updated_at: i64,
}

/// Partial update for an outbox entry. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboxUpdate {
    /// New status; must be a legal transition from the current one.
    pub status: Option<OutboxStatus>,
    /// Replacement payload (e.g. the user edited a failed message).
    pub payload: Option<Value>,
}

impl OutboxUpdate {
    /// Update only the status.
    pub fn status(status: OutboxStatus) -> Self {
        Self {
            status: Some(status),
            payload: None,
        }
    }

    /// Update only the payload.
    pub fn payload(payload: Value) -> Self {
        Self {
            status: None,
            payload: Some(payload),
        }
    }
}

/// Optimistic, UI-only mirror of an outbox entry.
///
/// Carries no seq: it is never used for ordering or counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMessage {
    /// Same key as the outbox entry.
    pub client_msg_id: ClientMsgId,
    /// Channel the UI renders it in.
    pub channel_id: ChannelId,
    /// Best-effort content mirror.
    pub content: Value,
    /// Mirrors the outbox entry's status.
    pub status: OutboxStatus,
    /// Client send time (unix millis), used to order pending messages.
    pub created_at: i64,
}

impl LocalMessage {
    /// Build the overlay entry that mirrors an outbox entry.
    pub fn mirror(entry: &OutboxEntry) -> Self {
        Self {
            client_msg_id: entry.client_msg_id.clone(),
            channel_id: entry.channel_id.clone(),
            content: entry.payload.clone(),
            status: entry.status,
            created_at: entry.created_at,
        }
    }
}

/// Last server version observed for a message's mutable facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    /// Stamped version.
    pub version: Version,
    /// When the stamp was written (unix millis).
    pub observed_at: i64,
}

/// A mutation event for a cached message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePatch {
    /// Content was edited.
    Edit {
        /// New content.
        content: Value,
        /// Server edit time (unix millis).
        edited_at: i64,
    },
    /// Reaction state changed; replaces the stored reactions.
    Reactions {
        /// Full reaction state after the change.
        reactions: Value,
    },
    /// Message was deleted; content is cleared and a tombstone kept.
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            OutboxStatus::Queued,
            OutboxStatus::Sending,
            OutboxStatus::Sent,
            OutboxStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "delivered".parse::<OutboxStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown outbox status: delivered");
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&OutboxStatus::Sending).unwrap(),
            "\"sending\""
        );
    }

    #[test]
    fn message_from_transport_json() {
        let msg: Message = serde_json::from_value(json!({
            "id": "m1",
            "channel_id": "c1",
            "seq": 13,
            "client_msg_id": "x",
            "content": {"text": "hi"}
        }))
        .unwrap();

        assert_eq!(msg.seq, Seq::new(13));
        assert_eq!(msg.client_msg_id, Some(ClientMsgId::from("x")));
        assert_eq!(msg.reactions, Value::Null);
        assert!(!msg.deleted);
    }

    #[test]
    fn local_message_mirrors_outbox_entry() {
        let entry = OutboxEntry {
            client_msg_id: ClientMsgId::from("x"),
            channel_id: ChannelId::from("c1"),
            payload: json!({"text": "hi"}),
            status: OutboxStatus::Queued,
            created_at: 42,
            updated_at: 42,
        };

        let local = LocalMessage::mirror(&entry);
        assert_eq!(local.client_msg_id, entry.client_msg_id);
        assert_eq!(local.content, entry.payload);
        assert_eq!(local.status, OutboxStatus::Queued);
        assert_eq!(local.created_at, 42);
    }

    #[test]
    fn patch_is_tagged_by_kind() {
        let patch: MessagePatch = serde_json::from_value(json!({"kind": "delete"})).unwrap();
        assert_eq!(patch, MessagePatch::Delete);

        let patch: MessagePatch = serde_json::from_value(json!({
            "kind": "edit",
            "content": {"text": "fixed"},
            "edited_at": 5
        }))
        .unwrap();
        assert!(matches!(patch, MessagePatch::Edit { edited_at: 5, .. }));
    }
}
