//! Inbound coalescing and outbound shaping: the glue between the channel and
//! reply generation.
//!
//! Flow: channel event → [`inbound::Inbox`] records the turn and feeds the
//! [`queue::Aggregator`] → debounce fires → [`reply::AutoReply`] asks the reply
//! generator → [`chunk::segment`] builds a [`chunk::DeliveryPlan`] →
//! [`delivery::Dispatcher`] paces it out while [`presence::PresenceSignaler`]
//! keeps the "composing" indicator alive.

pub mod chunk;
pub mod conversations;
pub mod delivery;
pub mod error;
pub mod extract;
pub mod inbound;
mod locks;
pub mod markup;
pub mod presence;
pub mod queue;
pub mod reply;

pub use error::{Error, Result};
