use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;

use crate::cache::TaskCache;
use crate::error::{Error, LoadError, LoadResult, Result};
use crate::fetcher::Fetcher;
use crate::options::LoaderOptions;
use crate::pending::PendingBuffer;
use crate::promise::{Promise, PromiseFuture};

/// Future returned by [`DataLoader::load`].
pub type LoadFuture<V, E> = PromiseFuture<LoadResult<V, E>>;

/// Floor for the background loop sleep so an empty buffer never spins.
const MIN_DISPATCH_DELAY: Duration = Duration::from_millis(1);

/// Request-coalescing loader: deduplicates and batches keyed lookups
/// against a user-supplied [`Fetcher`].
///
/// Reference: <https://github.com/facebook/dataloader>
pub struct DataLoader<K, F>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    F: Fetcher<K>,
{
    inner: Arc<Inner<K, F>>,
    stop: watch::Sender<bool>,
}

struct Inner<K, F>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    F: Fetcher<K>,
{
    fetcher: F,
    options: LoaderOptions<K>,
    cache: Option<TaskCache<K, LoadResult<F::Value, F::Error>>>,
    pending: Mutex<PendingBuffer<K, LoadResult<F::Value, F::Error>>>,
    stopped: watch::Receiver<bool>,
    disposed: AtomicBool,
    dispatcher_started: AtomicBool,
}

impl<K, F> DataLoader<K, F>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    F: Fetcher<K>,
{
    /// Creates a loader with default [`LoaderOptions`].
    pub fn new(fetcher: F) -> Self {
        Self::with_options(fetcher, LoaderOptions::default())
    }

    pub fn with_options(fetcher: F, options: LoaderOptions<K>) -> Self {
        let cache = if options.disable_caching {
            None
        } else {
            NonZeroUsize::new(options.cache_size)
                .map(|capacity| TaskCache::new(capacity, options.sliding_expiration))
        };
        let (stop, stopped) = watch::channel(false);

        DataLoader {
            inner: Arc::new(Inner {
                fetcher,
                cache,
                pending: Mutex::new(PendingBuffer::default()),
                stopped,
                disposed: AtomicBool::new(false),
                dispatcher_started: AtomicBool::new(false),
                options,
            }),
            stop,
        }
    }

    /// Returns a future for the value under `key`, joining the
    /// in-flight promise when one exists. The synchronous body never
    /// blocks; fetch failures surface only through the future.
    pub fn load(&self, key: K) -> Result<LoadFuture<F::Value, F::Error>> {
        self.ensure_active()?;
        let key = self.inner.resolve(&key);

        if let Some(cache) = &self.inner.cache {
            if let Some(promise) = cache.get(&key) {
                return Ok(promise.future());
            }
        }

        let promise = Promise::new();

        if self.inner.options.disable_batching {
            if let Some(cache) = &self.inner.cache {
                if !cache.add(key.clone(), promise.clone()) {
                    // A parallel load of this key cached its promise between
                    // our miss and here; share that one instead of fetching.
                    if let Some(existing) = cache.get(&key) {
                        return Ok(existing.future());
                    }
                }
            }
            let inner = self.inner.clone();
            let single = promise.clone();
            let single_key = key.clone();
            tokio::spawn(async move { inner.dispatch_single(single_key, single).await });
            return Ok(promise.future());
        }

        {
            let mut pending = self.inner.pending.lock().unwrap();
            if !pending.try_add(key.clone(), promise.clone()) {
                // Another load of this key joined the window first; share
                // its promise and drop the one we just made.
                let existing = pending
                    .get(&key)
                    .expect("pending buffer holds a promise for a refused key");
                return Ok(existing.future());
            }
        }

        if let Some(cache) = &self.inner.cache {
            cache.set(key, promise.clone());
        }

        Ok(promise.future())
    }

    /// Loads every key, resolving once all of them settle. Results come
    /// back in input order.
    pub async fn load_many<I>(&self, keys: I) -> Result<Vec<LoadResult<F::Value, F::Error>>>
    where
        I: IntoIterator<Item = K>,
    {
        self.ensure_active()?;
        let futures = keys
            .into_iter()
            .map(|key| self.load(key))
            .collect::<Result<Vec<_>>>()?;
        if futures.is_empty() {
            return Err(Error::EmptyKeys);
        }

        Ok(join_all(futures).await)
    }

    /// Caches `promise` under `key` unless the key is already cached.
    pub fn set(&self, key: K, promise: Promise<LoadResult<F::Value, F::Error>>) -> Result<()> {
        self.ensure_active()?;
        let key = self.inner.resolve(&key);
        if let Some(cache) = &self.inner.cache {
            cache.add(key, promise);
        }
        Ok(())
    }

    /// Feed some data into the cache as pre-settled promises. Keys that
    /// are already cached keep their current promise.
    pub fn feed_many<I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, F::Value)>,
    {
        for (key, value) in values {
            self.set(key, Promise::settled(Ok(value)))?;
        }
        Ok(())
    }

    pub fn feed_one(&self, key: K, value: F::Value) -> Result<()> {
        self.feed_many(std::iter::once((key, value)))
    }

    /// Drops `key` from the cache; the next load fetches it afresh.
    pub fn remove(&self, key: &K) -> Result<()> {
        self.ensure_active()?;
        let key = self.inner.resolve(key);
        if let Some(cache) = &self.inner.cache {
            cache.remove(&key);
        }
        Ok(())
    }

    /// Empties the cache.
    pub fn clear(&self) -> Result<()> {
        self.ensure_active()?;
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }
        Ok(())
    }

    /// Drains the pending buffer and fetches it in insertion order,
    /// split into chunks of at most `max_batch_size` keys. Completes
    /// when every chunk has been fetched and settled.
    pub async fn dispatch_batch(&self) -> Result<()> {
        self.ensure_active()?;
        self.inner.dispatch_batch().await;
        Ok(())
    }

    /// Spawns the background dispatch loop. Calling it again is a no-op.
    pub fn start_dispatcher(&self) -> Result<()> {
        self.ensure_active()?;
        if self.inner.dispatcher_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.dispatch_loop().await });
        Ok(())
    }

    /// Number of promises currently cached.
    pub fn cached_len(&self) -> usize {
        self.inner.cache.as_ref().map(TaskCache::len).unwrap_or(0)
    }

    /// Cache hit rate so far, when caching is on and has seen traffic.
    pub fn hit_rate(&self) -> Option<f64> {
        self.inner.cache.as_ref().and_then(TaskCache::hit_rate)
    }

    /// Stops the dispatcher, clears the cache and rejects further use.
    /// Safe to call more than once; in-flight fetches are not cancelled
    /// and promises already handed out stay valid.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop.send(true);
        if let Some(cache) = &self.inner.cache {
            cache.clear();
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(Error::Disposed);
        }
        Ok(())
    }
}

impl<K, F> Drop for DataLoader<K, F>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    F: Fetcher<K>,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<K, F> Inner<K, F>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    F: Fetcher<K>,
{
    fn resolve(&self, key: &K) -> K {
        match &self.options.cache_key_resolver {
            Some(resolver) => resolver(key),
            None => key.clone(),
        }
    }

    /// Only the emptiness check and the buffer swap run under the core
    /// mutex; the fetch itself happens on the swapped-out snapshot.
    async fn dispatch_batch(&self) {
        let snap = {
            let mut pending = self.pending.lock().unwrap();
            if pending.is_empty() {
                return;
            }
            std::mem::take(&mut *pending)
        };
        tracing::debug!(pending = snap.len(), "dispatching batch");

        let keys: Vec<K> = snap.keys().cloned().collect();
        if self.options.max_batch_size > 0 {
            for chunk in keys.chunks(self.options.max_batch_size) {
                self.fetch_chunk(chunk, &snap).await;
            }
        } else {
            self.fetch_chunk(&keys, &snap).await;
        }
    }

    async fn fetch_chunk(
        &self,
        chunk: &[K],
        snap: &PendingBuffer<K, LoadResult<F::Value, F::Error>>,
    ) {
        match self.fetcher.fetch(chunk).await {
            Ok(results) => {
                let returned = results.len();
                if returned != chunk.len() {
                    tracing::warn!(
                        expected = chunk.len(),
                        returned,
                        "batch fetch returned a misaligned result list"
                    );
                }
                let mut results = results.into_iter();
                for key in chunk {
                    let outcome = match results.next() {
                        Some(Ok(value)) => Ok(value),
                        Some(Err(error)) => Err(LoadError::Fetch(error)),
                        None => Err(LoadError::ShapeMismatch { expected: chunk.len(), returned }),
                    };
                    Self::settle(snap, key, outcome);
                }
                // Results beyond the chunk length are dropped.
            }
            Err(error) => {
                tracing::warn!(error = ?error, keys = chunk.len(), "batch fetch failed");
                for key in chunk {
                    Self::settle(snap, key, Err(LoadError::Fetch(error.clone())));
                }
            }
        }
    }

    /// One-key fetch used when batching is disabled.
    async fn dispatch_single(&self, key: K, promise: Promise<LoadResult<F::Value, F::Error>>) {
        let outcome = match self.fetcher.fetch(std::slice::from_ref(&key)).await {
            Ok(results) => {
                let returned = results.len();
                match results.into_iter().next() {
                    Some(Ok(value)) => Ok(value),
                    Some(Err(error)) => Err(LoadError::Fetch(error)),
                    None => Err(LoadError::ShapeMismatch { expected: 1, returned }),
                }
            }
            Err(error) => {
                tracing::warn!(error = ?error, "single-key fetch failed");
                Err(LoadError::Fetch(error))
            }
        };
        promise.try_set(outcome);
    }

    fn settle(
        snap: &PendingBuffer<K, LoadResult<F::Value, F::Error>>,
        key: &K,
        outcome: LoadResult<F::Value, F::Error>,
    ) {
        if let Some(promise) = snap.get(key) {
            // A promise fulfilled through `set` in the meantime is left
            // as-is; the dispatcher's result is swallowed.
            promise.try_set(outcome);
        }
    }

    async fn dispatch_loop(&self) {
        let mut stopped = self.stopped.clone();
        let delay = self.options.batch_request_delay.max(MIN_DISPATCH_DELAY);
        tracing::debug!(?delay, "dispatch loop started");

        loop {
            tokio::select! {
                _ = stopped.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let has_pending = !self.pending.lock().unwrap().is_empty();
            if has_pending {
                self.dispatch_batch().await;
            }
        }

        tracing::debug!("dispatch loop stopped");
    }
}
