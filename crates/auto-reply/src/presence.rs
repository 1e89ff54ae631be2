//! Keeps the "composing" indicator alive while a reply is being delivered.
//!
//! Platforms expire a composing indicator after a few seconds, so it is
//! re-announced on an interval until the signaler is stopped or dropped.

use std::{sync::Arc, time::Duration};

use {
    courier_channels::{ChannelOutbound, Presence},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

/// Scoped handle to a running presence loop. Dropping it stops the loop.
pub struct PresenceSignaler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PresenceSignaler {
    /// Announce "composing" once, then keep re-announcing every `interval`.
    ///
    /// The first announcement is sent before this returns so it is ordered
    /// ahead of anything the caller sends next. Failures are logged and
    /// otherwise ignored.
    pub async fn start(outbound: Arc<dyn ChannelOutbound>, to: String, interval: Duration) -> Self {
        announce(outbound.as_ref(), &to, Presence::Composing).await;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {},
                }
                announce(outbound.as_ref(), &to, Presence::Composing).await;
            }
        });

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop re-announcing and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for PresenceSignaler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Send a presence change, best effort.
pub async fn announce(outbound: &dyn ChannelOutbound, to: &str, presence: Presence) {
    if let Err(e) = outbound.send_presence(to, presence).await {
        debug!(to, ?presence, "presence announcement failed: {e}");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        async_trait::async_trait,
        courier_common::types::MediaKind,
        std::sync::Mutex,
    };

    #[derive(Default)]
    struct CountingOutbound {
        composing: Mutex<u32>,
        fail: bool,
    }

    #[async_trait]
    impl ChannelOutbound for CountingOutbound {
        async fn send_text(&self, _to: &str, _text: &str) -> courier_channels::Result<()> {
            Ok(())
        }

        async fn send_media(
            &self,
            _to: &str,
            _kind: MediaKind,
            _url: &str,
        ) -> courier_channels::Result<()> {
            Ok(())
        }

        async fn send_presence(&self, _to: &str, presence: Presence) -> courier_channels::Result<()> {
            if presence == Presence::Composing {
                *self.composing.lock().unwrap() += 1;
            }
            if self.fail {
                return Err(courier_channels::Error::unavailable("presence down"));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reannounces_until_stopped() {
        let outbound = Arc::new(CountingOutbound::default());
        let signaler =
            PresenceSignaler::start(outbound.clone(), "psid-1".into(), Duration::from_secs(8)).await;
        assert_eq!(*outbound.composing.lock().unwrap(), 1);
        assert!(signaler.is_running());

        tokio::time::sleep(Duration::from_secs(17)).await;
        assert_eq!(*outbound.composing.lock().unwrap(), 3);

        signaler.stop().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(*outbound.composing.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_loop() {
        let outbound = Arc::new(CountingOutbound::default());
        {
            let _signaler =
                PresenceSignaler::start(outbound.clone(), "psid-1".into(), Duration::from_secs(1))
                    .await;
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*outbound.composing.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_loop() {
        let outbound = Arc::new(CountingOutbound {
            fail: true,
            ..Default::default()
        });
        let signaler =
            PresenceSignaler::start(outbound.clone(), "psid-1".into(), Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*outbound.composing.lock().unwrap(), 3);
        signaler.stop().await;
    }
}
