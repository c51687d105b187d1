//! Strongly-typed decoded kernel messages.

mod link;

pub use link::LinkMessage;
