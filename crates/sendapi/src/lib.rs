//! Send API channel adapter.
//!
//! Outbound parts are posted to `{base_url}/messages` with a bearer
//! credential; inbound webhook bodies are parsed into [`InboundEvent`]s.
//!
//! [`InboundEvent`]: courier_common::types::InboundEvent

pub mod outbound;
pub mod webhook;

pub use {outbound::SendApiOutbound, webhook::parse_webhook};
