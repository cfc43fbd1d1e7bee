// src/core/stream_blocking.rs

//! Wait queues for clients parked on `XREAD BLOCK`.
//!
//! Unlike `BLPOP`, a blocked `XREAD` can be watching several streams at
//! once and does not know in advance which one (if any) will receive the
//! entry that wakes it. Waking a stream waiter therefore just delivers a
//! signal; the caller always re-scans every watched stream for entries
//! newer than the ID it was blocked on before deciding whether to reply or
//! go back to sleep.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

struct StreamWaiter {
    session_id: u64,
    sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Default)]
pub struct StreamBlockerManager {
    waiters: DashMap<Bytes, Vec<StreamWaiter>>,
}

impl StreamBlockerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session_id` on every key in `keys`, sharing one receiver:
    /// the first key to be notified wakes the caller, and the shared
    /// `Option` ensures it is woken exactly once even if several of its
    /// watched keys are notified concurrently.
    pub fn register(&self, keys: &[Bytes], session_id: u64) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let sender = Arc::new(Mutex::new(Some(tx)));
        for key in keys {
            self.waiters.entry(key.clone()).or_default().push(StreamWaiter {
                session_id,
                sender: sender.clone(),
            });
        }
        rx
    }

    /// Called after a successful `XADD` to `key`; wakes every waiter
    /// registered on it.
    pub async fn notify(&self, key: &[u8]) {
        let Some(mut list) = self.waiters.get_mut(key) else {
            return;
        };
        for waiter in list.iter() {
            let mut slot = waiter.sender.lock().await;
            if let Some(sender) = slot.take() {
                let _ = sender.send(());
            }
        }
        list.clear();
    }

    /// Removes a still-pending registration across all of `keys`, used when
    /// a blocked `XREAD` times out or the client disconnects.
    pub fn remove_waiter(&self, keys: &[Bytes], session_id: u64) {
        for key in keys {
            if let Some(mut list) = self.waiters.get_mut(key) {
                list.retain(|w| w.session_id != session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifying_one_watched_key_wakes_the_waiter() {
        let mgr = StreamBlockerManager::new();
        let keys = vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")];
        let rx = mgr.register(&keys, 1);
        mgr.notify(b"b").await;
        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn removed_waiter_is_not_woken() {
        let mgr = StreamBlockerManager::new();
        let keys = vec![Bytes::from_static(b"a")];
        let rx = mgr.register(&keys, 1);
        mgr.remove_waiter(&keys, 1);
        mgr.notify(b"a").await;
        assert!(rx.await.is_err());
    }
}
