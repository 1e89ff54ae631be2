//! Channel seams.
//!
//! The delivery pipeline talks to the outside world through the traits defined
//! here: `ChannelOutbound` for the messaging platform, `ChannelEventSink` for
//! observer fan-out, and `HistoryStore` for persisted turns.

pub mod error;
pub mod plugin;
pub mod store;

pub use {
    error::{Error, Result},
    plugin::{ChannelEvent, ChannelEventSink, ChannelOutbound, NoopEventSink, Presence},
    store::{HistoryStore, InMemoryHistoryStore},
};
