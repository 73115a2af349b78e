//! Error types for chatsync records.

use thiserror::Error;

/// Errors raised while interpreting stored or transported record fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// A status string that is not one of the four outbox states.
    #[error("unknown outbox status: {0}")]
    UnknownStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypeError>();
    }
}
