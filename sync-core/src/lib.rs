//! # sync-core
//!
//! Pure logic for chatsync (no I/O, instant tests).
//!
//! This crate implements the decisions behind the offline message cache
//! without touching disk, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Storage backends that only persist what was already decided
//!
//! The actual I/O (SQLite, in-memory maps) is performed by `sync-store`,
//! which commits the plans produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod cursor;
pub mod outbox;
pub mod reconcile;
pub mod view;

pub use conflict::{apply_patch, decide, Decision};
pub use cursor::{CursorTracker, CursorUpdate};
pub use outbox::{apply_update, can_transition, check_transition, mirror_into, TransitionError};
pub use reconcile::{plan_page, PageError, PagePlan};
pub use view::{merge_view, ViewItem};
