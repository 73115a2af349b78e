//! # sync-types
//!
//! Record types for the chatsync offline message cache.
//!
//! This crate provides the foundational types shared by every chatsync crate:
//! - [`ChannelId`], [`MessageId`], [`ClientMsgId`] - opaque identifiers
//! - [`Seq`], [`Version`] - server-assigned ordering and revision tokens
//! - [`Message`], [`SyncCursor`], [`OutboxEntry`], [`LocalMessage`],
//!   [`ChannelMeta`], [`VersionStamp`] - the six persisted record families
//! - [`TypeError`] - error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod records;

pub use error::TypeError;
pub use ids::{ChannelId, ClientMsgId, MessageId, Seq, Version};
pub use records::{
    ChannelMeta, LocalMessage, Message, MessagePatch, OutboxEntry, OutboxStatus, OutboxUpdate,
    SyncCursor, SyncState, VersionStamp,
};
