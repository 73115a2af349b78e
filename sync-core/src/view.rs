//! Merged display view of a channel.
//!
//! Confirmed messages are ordered by seq. Pending overlay entries have no
//! seq, so they follow the confirmed ones in client send order. An overlay
//! entry whose confirmed copy is already present is superseded and left out.

use std::collections::HashSet;

use chatsync_types::{ChannelId, ClientMsgId, LocalMessage, Message};
use serde::Serialize;

/// One row of the merged view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ViewItem {
    /// Authoritative server copy.
    Confirmed(Message),
    /// Optimistic placeholder still waiting for confirmation.
    Pending(LocalMessage),
}

impl ViewItem {
    /// Channel the row belongs to.
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            ViewItem::Confirmed(m) => &m.channel_id,
            ViewItem::Pending(l) => &l.channel_id,
        }
    }

    /// Client id, if the row originated from a local send.
    pub fn client_msg_id(&self) -> Option<&ClientMsgId> {
        match self {
            ViewItem::Confirmed(m) => m.client_msg_id.as_ref(),
            ViewItem::Pending(l) => Some(&l.client_msg_id),
        }
    }

    /// Whether the row is an optimistic placeholder.
    pub fn is_pending(&self) -> bool {
        matches!(self, ViewItem::Pending(_))
    }
}

/// Merge confirmed messages and overlay entries into display order.
pub fn merge_view(mut confirmed: Vec<Message>, mut pending: Vec<LocalMessage>) -> Vec<ViewItem> {
    confirmed.sort_by_key(|m| m.seq);

    let superseded: HashSet<&ClientMsgId> = confirmed
        .iter()
        .filter_map(|m| m.client_msg_id.as_ref())
        .collect();
    pending.retain(|l| !superseded.contains(&l.client_msg_id));
    pending.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.client_msg_id.cmp(&b.client_msg_id))
    });

    let mut view = Vec::with_capacity(confirmed.len() + pending.len());
    view.extend(confirmed.into_iter().map(ViewItem::Confirmed));
    view.extend(pending.into_iter().map(ViewItem::Pending));
    view
}
