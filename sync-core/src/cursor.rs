//! Sync cursor tracking for chatsync.
//!
//! A channel's cursor is the highest server sequence number that has been
//! durably applied to the local cache. It drives incremental pulls ("give me
//! everything after `max_seq`") and must never move backwards: a regressed
//! cursor would make the client re-pull pages it already holds, or worse,
//! let a slow page overwrite the progress recorded by a faster one.
//!
//! The tracker here is pure. Storage backends persist whatever it decides.

use chatsync_types::Seq;

/// Result of asking the tracker to move the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorUpdate {
    /// The cursor moved forward.
    Advanced {
        /// Previous value.
        from: Seq,
        /// New value.
        to: Seq,
    },
    /// The requested value equals the current one, or a page held nothing new.
    Unchanged(Seq),
    /// An explicit set tried to move the cursor backwards.
    Rejected {
        /// Current value, left in place.
        current: Seq,
        /// The refused value.
        requested: Seq,
    },
}

impl CursorUpdate {
    /// The cursor value after this update.
    pub fn resulting(&self) -> Seq {
        match *self {
            CursorUpdate::Advanced { to, .. } => to,
            CursorUpdate::Unchanged(seq) => seq,
            CursorUpdate::Rejected { current, .. } => current,
        }
    }

    /// Whether the cursor has to be written back.
    pub fn is_advanced(&self) -> bool {
        matches!(self, CursorUpdate::Advanced { .. })
    }
}

/// Monotonic per-channel cursor.
///
/// Two ways to move it:
/// - [`CursorTracker::set`] is an explicit write and refuses to go backwards.
/// - [`CursorTracker::observe`] folds in the seqs of an applied page; older
///   seqs (a back-filled history page) simply leave it where it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorTracker {
    max_seq: Seq,
}

impl CursorTracker {
    /// Create a tracker at seq 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a persisted value.
    pub fn with_seq(max_seq: Seq) -> Self {
        Self { max_seq }
    }

    /// Highest seq durably applied.
    pub fn max_seq(&self) -> Seq {
        self.max_seq
    }

    /// Decide an explicit set without applying it.
    pub fn plan_set(&self, requested: Seq) -> CursorUpdate {
        if requested > self.max_seq {
            CursorUpdate::Advanced {
                from: self.max_seq,
                to: requested,
            }
        } else if requested == self.max_seq {
            CursorUpdate::Unchanged(self.max_seq)
        } else {
            CursorUpdate::Rejected {
                current: self.max_seq,
                requested,
            }
        }
    }

    /// Explicitly set the cursor. Backwards moves are rejected and leave the
    /// tracker untouched.
    pub fn set(&mut self, requested: Seq) -> CursorUpdate {
        let update = self.plan_set(requested);
        self.max_seq = update.resulting();
        update
    }

    /// Fold the seqs of an applied page into the cursor.
    pub fn observe<I>(&mut self, seqs: I) -> CursorUpdate
    where
        I: IntoIterator<Item = Seq>,
    {
        let from = self.max_seq;
        let page_max = seqs.into_iter().max().unwrap_or_else(Seq::zero);
        if page_max > from {
            self.max_seq = page_max;
            CursorUpdate::Advanced { from, to: page_max }
        } else {
            CursorUpdate::Unchanged(from)
        }
    }

    /// Whether a server reporting `server_max` has anything we have not applied.
    pub fn needs_sync(&self, server_max: Seq) -> bool {
        server_max > self.max_seq
    }
}
