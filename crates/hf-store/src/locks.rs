//! Per-media mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use hf_core::MediaId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard held while operating on one media item's directory tree.
pub type MediaLock = OwnedMutexGuard<()>;

/// Registry of one async mutex per media ID.
#[derive(Debug, Default)]
pub struct MediaLocks {
    locks: DashMap<MediaId, Arc<Mutex<()>>>,
}

impl MediaLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: MediaId) -> MediaLock {
        let mutex = self.locks.entry(id).or_default().clone();
        mutex.lock_owned().await
    }

    /// Drop the mutex for `id` if nobody holds or waits on it.
    pub fn prune(&self, id: MediaId) {
        self.locks.remove_if(&id, |_, m| Arc::strong_count(m) == 1);
    }

    /// Number of IDs with a live mutex.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn id(n: u64) -> MediaId {
        MediaId::new(n).unwrap()
    }

    #[tokio::test]
    async fn same_id_is_exclusive() {
        let locks = Arc::new(MediaLocks::new());
        let guard = locks.lock(id(1)).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(id(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = MediaLocks::new();
        let _a = locks.lock(id(1)).await;
        tokio::time::timeout(Duration::from_secs(1), locks.lock(id(2)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = MediaLocks::new();
        let guard = locks.lock(id(5)).await;
        locks.prune(id(5));
        assert_eq!(locks.len(), 1);

        drop(guard);
        locks.prune(id(5));
        assert!(locks.is_empty());
    }
}
