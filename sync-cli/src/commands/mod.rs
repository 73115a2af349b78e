//! CLI command implementations.

pub mod apply;
pub mod channels;
pub mod clear;
pub mod messages;
pub mod outbox;
pub mod send;
pub mod status;
pub mod view;
