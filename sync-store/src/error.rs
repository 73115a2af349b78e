//! Error types for sync-store.
//!
//! Errors fall into three groups:
//! - store unavailable ([`StorageError::is_unavailable`]): the device store
//!   cannot be opened, read or written. Fatal to the operation and surfaced
//!   as-is; retrying is the caller's call.
//! - guard violations ([`StorageError::is_guard_violation`]): a cursor moved
//!   backwards, a duplicate outbox key, an illegal status write. These are
//!   caller bugs and are rejected, never coerced.
//! - everything else is configuration or input validation.
//!
//! Benign races (updating or removing an entry that is already gone) and
//! stale mutation events are not errors at all.

use std::path::PathBuf;

use sync_core::{PageError, TransitionError};
use sync_types::{ChannelId, ClientMsgId, Seq};

/// Main error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The page handed over by the transport was refused.
    #[error("rejected page: {0}")]
    Page(#[from] PageError),

    /// Too many unconfirmed sends.
    #[error("outbox full (capacity: {capacity})")]
    OutboxFull {
        /// Configured capacity.
        capacity: usize,
    },
}

impl EngineError {
    /// Whether the underlying store is unavailable or corrupted.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, EngineError::Storage(e) if e.is_unavailable())
    }

    /// Whether this is a rejected caller bug rather than an infrastructure fault.
    pub fn is_guard_violation(&self) -> bool {
        match self {
            EngineError::Storage(e) => e.is_guard_violation(),
            EngineError::Page(_) => true,
            _ => false,
        }
    }
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store has been deleted or cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Encoding an opaque value failed.
    #[error("record encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Decoding an opaque value failed.
    #[error("record decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// I/O error while creating or removing store files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },

    /// A numeric field does not fit the storage column.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: u64,
    },

    /// An outbox entry with this client id already exists.
    #[error("outbox entry already exists: {client_msg_id}")]
    DuplicateOutboxEntry {
        /// The duplicated id.
        client_msg_id: ClientMsgId,
    },

    /// Attempt to move a channel cursor backwards.
    #[error("cursor for {channel_id} cannot move back from {current} to {requested}")]
    CursorRegression {
        /// Channel id.
        channel_id: ChannelId,
        /// Cursor value in the store.
        current: Seq,
        /// Refused value.
        requested: Seq,
    },

    /// Outbox status write outside the transition table.
    #[error("outbox entry {client_msg_id}: {source}")]
    InvalidTransition {
        /// Entry the write targeted.
        client_msg_id: ClientMsgId,
        /// The refused transition.
        source: TransitionError,
    },
}

impl StorageError {
    /// Whether the store itself is unusable (error class "store unavailable").
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::Database(_)
                | StorageError::Unavailable(_)
                | StorageError::Corrupt(_)
                | StorageError::Decode(_)
                | StorageError::Io(_)
                | StorageError::InvalidPath { .. }
        )
    }

    /// Whether this is a stale-write guard rejecting a caller bug.
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            StorageError::DuplicateOutboxEntry { .. }
                | StorageError::CursorRegression { .. }
                | StorageError::InvalidTransition { .. }
        )
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
