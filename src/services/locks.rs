//! Per-key async locks: one writer at a time per user cart or per order.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle entries are swept once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug)]
pub struct KeyedLocks<K> {
    inflight: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }

    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            if inflight.len() > SWEEP_THRESHOLD {
                inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(inflight.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        lock.lock_owned().await
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::<u32>::new());
        let active = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let (locks, active) = (Arc::clone(&locks), Arc::clone(&active));
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&7).await;
                assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles { h.await.unwrap(); }
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::<u32>::new();
        let _a = locks.acquire(&1).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&2)).await;
        assert!(b.is_ok());
    }
}
