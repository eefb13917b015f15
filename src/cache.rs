use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::promise::Promise;

struct Entry<T> {
    promise: Promise<T>,
    touched: Instant,
}

/// Bounded store of in-flight and settled load promises. Eviction is
/// sliding idle expiration first, then least-recently-used order once
/// the capacity is reached.
pub struct TaskCache<K: Hash + Eq, T> {
    entries: Mutex<LruCache<K, Entry<T>>>,
    sliding_expiration: Duration,
    hits: AtomicUsize,
    miss: AtomicUsize,
}

impl<K: Hash + Eq, T: Clone + Send + 'static> TaskCache<K, T> {
    /// A zero `sliding_expiration` keeps entries until they are evicted
    /// or removed.
    pub fn new(capacity: NonZeroUsize, sliding_expiration: Duration) -> Self {
        TaskCache {
            entries: Mutex::new(LruCache::new(capacity)),
            sliding_expiration,
            hits: AtomicUsize::new(0),
            miss: AtomicUsize::new(0),
        }
    }

    /// Returns the promise stored under `key`, refreshing both its
    /// recency and its idle stamp. An entry idle past the sliding
    /// window is dropped and misses.
    pub fn get(&self, key: &K) -> Option<Promise<T>> {
        let mut entries = self.entries.lock().unwrap();
        let hit = match entries.get_mut(key) {
            Some(entry) if !self.idle_too_long(entry.touched) => {
                entry.touched = Instant::now();
                Some(entry.promise.clone())
            }
            Some(_) => None,
            None => {
                self.miss.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match hit {
            Some(promise) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(promise)
            }
            None => {
                entries.pop(key);
                self.miss.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts or overwrites, evicting the least-recently-used entry on
    /// overflow.
    pub fn set(&self, key: K, promise: Promise<T>) {
        let mut entries = self.entries.lock().unwrap();
        entries.put(key, Entry { promise, touched: Instant::now() });
    }

    /// Inserts only when `key` has no live entry. Returns whether it did.
    pub fn add(&self, key: K, promise: Promise<T>) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let live = match entries.peek(&key) {
            Some(entry) => !self.idle_too_long(entry.touched),
            None => false,
        };
        if live {
            return false;
        }
        entries.put(key, Entry { promise, touched: Instant::now() });
        true
    }

    pub fn remove(&self, key: &K) {
        self.entries.lock().unwrap().pop(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_rate(&self) -> Option<f64> {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.miss.load(Ordering::Relaxed);

        if hits + misses > 0 {
            return Some(hits as f64 / (hits + misses) as f64);
        }

        None
    }

    fn idle_too_long(&self, touched: Instant) -> bool {
        !self.sliding_expiration.is_zero() && touched.elapsed() >= self.sliding_expiration
    }
}
