//! Gateway: webhook server, observer fan-out and wiring.
//!
//! Lifecycle:
//! 1. Build the channel adapter and reply generator from config
//! 2. Wire directory, aggregator, dispatcher and inbox
//! 3. Serve `/webhook`, `/health`, assignment and event-stream routes
//! 4. On shutdown, cancel pending quiet-period timers

pub mod broadcast;
pub mod reply_client;
pub mod server;
pub mod state;
