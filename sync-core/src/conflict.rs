//! Stale-event detection for message mutations.
//!
//! Edit, reaction and delete events arrive over a push channel that does
//! not guarantee ordering. Each event carries the server [`Version`] of the
//! message after the mutation; the store remembers the newest version it has
//! applied in a [`VersionStamp`]. An event is applied only when it is strictly
//! newer than the stamp, or when there is no stamp yet. Everything else is a
//! replay or a late arrival and is dropped.
//!
//! Concurrent edits resolve as last-writer-wins by server version: the server
//! orders mutations, and the client converges on the highest version it sees.

use chatsync_types::{Message, MessagePatch, Version, VersionStamp};
use serde_json::Value;

/// What to do with an incoming mutation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Apply the patch and record the new version.
    Apply,
    /// Drop the event; `stored` is at least as new.
    Stale {
        /// Version already applied.
        stored: Version,
    },
}

impl Decision {
    /// Whether the event should be applied.
    pub fn should_apply(&self) -> bool {
        matches!(self, Decision::Apply)
    }
}

/// Compare an incoming version with the stored stamp.
///
/// The first event for a message always applies.
pub fn decide(stored: Option<&VersionStamp>, incoming: Version) -> Decision {
    match stored {
        None => Decision::Apply,
        Some(stamp) if incoming.is_newer_than(stamp.version) => Decision::Apply,
        Some(stamp) => Decision::Stale {
            stored: stamp.version,
        },
    }
}

/// Apply a mutation to a cached message in place.
pub fn apply_patch(message: &mut Message, patch: &MessagePatch) {
    match patch {
        MessagePatch::Edit { content, edited_at } => {
            message.content = content.clone();
            message.edited_at = Some(*edited_at);
        }
        MessagePatch::Reactions { reactions } => {
            message.reactions = reactions.clone();
        }
        MessagePatch::Delete => {
            message.content = Value::Null;
            message.reactions = Value::Null;
            message.deleted = true;
        }
    }
}
