//! # sync-store
//!
//! Durable offline message cache for chatsync.
//!
//! This crate persists what a chat client needs to keep working without a
//! connection:
//! - confirmed messages per channel, ordered by server seq
//! - a monotonic sync cursor per channel
//! - an outbox of unconfirmed sends that survives restarts
//! - optimistic overlay entries the UI renders until the server confirms
//! - version stamps that drop stale edit, reaction and delete events
//!
//! ## Architecture
//!
//! ```text
//!   transport            UI
//!       │                │
//!   ┌───┴────────────────┴───┐
//!   │       SyncEngine       │── sync-core (pure decisions)
//!   │  ┌──────────────────┐  │
//!   │  │   StoreBackend   │  │
//!   │  │ SQLite │ memory  │  │
//!   │  └──────────────────┘  │
//!   └────────────────────────┘
//! ```
//!
//! The engine never talks to the network. The transport pushes pages and
//! mutation events in; the UI reads ranges and the merged view out.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod storage;

pub use config::Config;
pub use engine::{ApplyReport, MutationOutcome, PageRequest, RecoveryReport, SyncEngine};
pub use error::{EngineError, EngineResult, StorageError, StorageResult};
pub use storage::{
    CommitOutcome, MemoryStore, OfflineStorage, SqliteStore, StoreBackend, SyncStorage,
};
