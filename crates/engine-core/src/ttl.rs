use dashmap::DashMap;
use std::{
    hash::Hash,
    time::{Duration, Instant},
};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent key-value store whose entries expire `ttl` after their last
/// write. Updates run under the entry's shard lock, so concurrent writers to
/// one key never lose an update.
#[derive(Debug)]
pub struct TtlStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Default,
{
    pub fn new(ttl: Duration) -> Self {
        TtlStore {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current value, or `None` when absent or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .map(|e| (e.expires_at > now).then(|| e.value.clone()));

        match value {
            Some(Some(v)) => Some(v),
            Some(None) => {
                self.entries.remove_if(key, |_, e| e.expires_at <= now);
                None
            }
            None => None,
        }
    }

    /// Atomically applies `f` to the value (a fresh default when absent or
    /// expired) and refreshes the expiry.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> R {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.clone()).or_insert_with(|| Entry {
            value: V::default(),
            expires_at: now + self.ttl,
        });

        if entry.expires_at <= now {
            entry.value = V::default();
        }
        let result = f(&mut entry.value);
        entry.expires_at = now + self.ttl;
        result
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, e)| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store: Arc<TtlStore<String, u64>> = Arc::new(TtlStore::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        store.update(&"dest".to_string(), |v| *v += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get(&"dest".to_string()), Some(8000));
    }

    #[test]
    fn expired_entries_read_as_absent_and_reset() {
        let store: TtlStore<&str, u32> = TtlStore::new(Duration::from_millis(20));
        store.update(&"k", |v| *v = 7);
        assert_eq!(store.get(&"k"), Some(7));

        thread::sleep(Duration::from_millis(40));
        assert_eq!(store.get(&"k"), None);
        assert_eq!(store.update(&"k", |v| *v), 0);
    }
}
