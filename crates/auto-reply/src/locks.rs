use std::{future::Future, sync::Arc};

use {dashmap::DashMap, tokio::sync::Mutex};

/// One async mutex per key, so work for the same key runs one at a time in
/// the order it asked for the lock. An entry lives only while some caller
/// holds or waits on it.
#[derive(Default)]
pub(crate) struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the lock for `key`.
    pub(crate) async fn run<T>(&self, key: &str, work: impl Future<Output = T>) -> T {
        let lock = self.locks.entry(key.to_string()).or_default().clone();
        let out = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        // Cloning happens under the shard lock, so a count of one means no
        // caller holds or waits on this entry.
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        out
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}
