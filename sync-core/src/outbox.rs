//! Outbox lifecycle rules for chatsync.
//!
//! Outgoing messages move through an explicit status table:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            ▼                              │ retry
//!        queued ──► sending ──► sent ──► failed
//!                      │                    ▲
//!                      └────────────────────┘
//! ```
//!
//! Writing the current status again is accepted as a no-op so a transport
//! can report the same progress twice. Every other write outside the table
//! is a caller bug and is rejected.
//!
//! The engine never decides *when* to move an entry; the transport layer
//! drives the table and owns retry and timeout policy.

use chatsync_types::{ChannelId, ClientMsgId, LocalMessage, OutboxEntry, OutboxStatus, OutboxUpdate};
use serde_json::Value;
use thiserror::Error;

/// An outbox status write outside the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal outbox transition: {from} -> {to}")]
pub struct TransitionError {
    /// Status the entry is in.
    pub from: OutboxStatus,
    /// Status that was requested.
    pub to: OutboxStatus,
}

/// Whether `from → to` is in the transition table (or a same-state write).
pub fn can_transition(from: OutboxStatus, to: OutboxStatus) -> bool {
    use OutboxStatus::*;

    from == to
        || matches!(
            (from, to),
            (Queued, Sending)
                | (Sending, Sent)
                | (Sending, Failed)
                | (Sent, Failed)
                | (Failed, Queued)
        )
}

/// Check a transition, returning the error the store should surface.
pub fn check_transition(from: OutboxStatus, to: OutboxStatus) -> Result<(), TransitionError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Build a fresh queued entry.
pub fn new_entry(
    client_msg_id: ClientMsgId,
    channel_id: ChannelId,
    payload: Value,
    now: i64,
) -> OutboxEntry {
    OutboxEntry {
        client_msg_id,
        channel_id,
        payload,
        status: OutboxStatus::Queued,
        created_at: now,
        updated_at: now,
    }
}

/// Apply a partial update to an entry, enforcing the transition table.
///
/// The input entry is left untouched on error.
pub fn apply_update(
    entry: &OutboxEntry,
    update: &OutboxUpdate,
    now: i64,
) -> Result<OutboxEntry, TransitionError> {
    let mut next = entry.clone();

    if let Some(status) = update.status {
        check_transition(entry.status, status)?;
        next.status = status;
    }
    if let Some(payload) = &update.payload {
        next.payload = payload.clone();
    }
    if next != *entry {
        next.updated_at = now;
    }

    Ok(next)
}

/// Bring an overlay entry in line with its outbox entry.
///
/// The overlay keeps its own `created_at` so a retry does not move the
/// message in the rendered list.
pub fn mirror_into(local: &LocalMessage, entry: &OutboxEntry) -> LocalMessage {
    LocalMessage {
        client_msg_id: local.client_msg_id.clone(),
        channel_id: local.channel_id.clone(),
        content: entry.payload.clone(),
        status: entry.status,
        created_at: local.created_at,
    }
}
