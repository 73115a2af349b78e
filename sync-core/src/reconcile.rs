//! Page reconciliation for chatsync.
//!
//! The transport hands the engine pages of confirmed messages, either from
//! an incremental pull or from the realtime push channel. Before anything is
//! written, a page is normalised into a [`PagePlan`]:
//!
//! - every message must belong to the page's channel
//! - repeated ids inside the page collapse to their first occurrence
//! - two different ids claiming the same seq is a server bug and rejects the page
//! - messages are ordered by seq
//! - the cursor target is `max(current, page max)`, never lower
//! - messages carrying a `client_msg_id` confirm a local send
//!
//! Storage backends then commit the plan in one transaction. Because rows are
//! keyed by `(channel_id, id)` and inserted only if absent, committing the same
//! plan twice leaves the cache exactly as committing it once.

use std::collections::{HashMap, HashSet};

use chatsync_types::{ChannelId, ClientMsgId, Message, MessageId, Seq};
use thiserror::Error;

use crate::cursor::{CursorTracker, CursorUpdate};

/// Reasons a page is refused before touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    /// A message addressed to a different channel than the page.
    #[error("message {message_id} belongs to channel {actual}, not {expected}")]
    ChannelMismatch {
        /// Channel the page was applied to.
        expected: ChannelId,
        /// Channel the message claims.
        actual: ChannelId,
        /// Offending message.
        message_id: MessageId,
    },

    /// Two different messages with the same seq in one channel.
    #[error("seq {seq} claimed by both {first} and {second}")]
    SeqCollision {
        /// The contested seq.
        seq: Seq,
        /// First message seen with it.
        first: MessageId,
        /// Second message seen with it.
        second: MessageId,
    },
}

/// A validated, ordered page ready to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    /// Channel the page applies to.
    pub channel_id: ChannelId,
    /// Deduplicated messages in ascending seq order.
    pub messages: Vec<Message>,
    /// Cursor movement implied by the page.
    pub cursor: CursorUpdate,
    /// Local sends confirmed by this page.
    pub confirmed: Vec<ClientMsgId>,
}

impl PagePlan {
    /// Cursor value once the page is committed.
    pub fn new_max(&self) -> Seq {
        self.cursor.resulting()
    }

    /// Whether the page holds nothing at all.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Validate and normalise a page against the channel's current cursor.
pub fn plan_page(
    channel_id: &ChannelId,
    current_max: Seq,
    messages: Vec<Message>,
) -> Result<PagePlan, PageError> {
    let mut seen_ids: HashSet<MessageId> = HashSet::with_capacity(messages.len());
    let mut seq_owner: HashMap<Seq, MessageId> = HashMap::with_capacity(messages.len());
    let mut kept = Vec::with_capacity(messages.len());

    for message in messages {
        if &message.channel_id != channel_id {
            return Err(PageError::ChannelMismatch {
                expected: channel_id.clone(),
                actual: message.channel_id,
                message_id: message.id,
            });
        }
        if !seen_ids.insert(message.id.clone()) {
            continue;
        }
        if let Some(first) = seq_owner.get(&message.seq) {
            return Err(PageError::SeqCollision {
                seq: message.seq,
                first: first.clone(),
                second: message.id,
            });
        }
        seq_owner.insert(message.seq, message.id.clone());
        kept.push(message);
    }

    kept.sort_by_key(|m| m.seq);

    let mut tracker = CursorTracker::with_seq(current_max);
    let cursor = tracker.observe(kept.iter().map(|m| m.seq));

    let confirmed = kept
        .iter()
        .filter_map(|m| m.client_msg_id.clone())
        .collect();

    Ok(PagePlan {
        channel_id: channel_id.clone(),
        messages: kept,
        cursor,
        confirmed,
    })
}
