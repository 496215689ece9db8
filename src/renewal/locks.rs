//! Async mutexes handed out per key.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots<K> = HashMap<K, Arc<AsyncMutex<()>>>;

/// One async mutex per key. A key's entry lives only while someone holds or
/// waits for its lock.
pub struct KeyedLocks<K> {
    slots: Mutex<Slots<K>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let slot = self.slots().entry(key.clone()).or_default().clone();
        let guard = slot.clone().lock_owned().await;
        KeyGuard {
            owner: self,
            key: key.clone(),
            slot,
            guard: Some(guard),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots<K>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots().len()
    }
}

pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedLocks<K>,
    key: K,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.owner.slots();
        // Only the map and this guard still point at the mutex: nobody waits.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let locks = KeyedLocks::default();
        let first = locks.lock(&1u32).await;
        let second = locks.lock(&2u32).await;
        assert_eq!(locks.tracked(), 2);

        drop(first);
        assert_eq!(locks.tracked(), 1);
        drop(second);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = KeyedLocks::default();
        let order = Mutex::new(Vec::new());

        let first = async {
            let _held = locks.lock(&"owner").await;
            tokio::task::yield_now().await;
            order.lock().unwrap().push(1);
        };
        let second = async {
            let _held = locks.lock(&"owner").await;
            order.lock().unwrap().push(2);
        };
        tokio::join!(first, second);

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        assert_eq!(locks.tracked(), 0);
    }
}
