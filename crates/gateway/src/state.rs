use std::sync::Arc;

use courier_auto_reply::inbound::Inbox;

use crate::broadcast::Broadcaster;

/// Shared gateway runtime state.
pub struct GatewayState {
    pub version: &'static str,
    pub inbox: Inbox,
    pub broadcaster: Arc<Broadcaster>,
}

impl GatewayState {
    pub fn new(inbox: Inbox, broadcaster: Arc<Broadcaster>) -> Arc<Self> {
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION"),
            inbox,
            broadcaster,
        })
    }
}
