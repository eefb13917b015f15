use std::sync::Arc;
use std::time::Duration;

use derive_setters::Setters;

/// Normalizes keys before any cache or buffer operation.
pub type CacheKeyResolver<K> = Arc<dyn Fn(&K) -> K + Send + Sync>;

/// Tuning knobs for a [`DataLoader`](crate::DataLoader).
#[derive(Setters, Clone)]
#[setters(strip_option)]
pub struct LoaderOptions<K> {
    /// Maximum number of cached promises. Zero disables caching.
    pub cache_size: usize,

    /// Idle window after which a cached promise is dropped; reset on
    /// every access. Zero keeps entries until evicted or removed.
    pub sliding_expiration: Duration,

    /// Key normalization applied before cache and buffer lookups.
    /// Identity when unset.
    pub cache_key_resolver: Option<CacheKeyResolver<K>>,

    /// Skip all cache interaction.
    pub disable_caching: bool,

    /// Dispatch a one-key fetch per load instead of coalescing.
    pub disable_batching: bool,

    /// Maximum keys per fetch call. Zero means one call per dispatch.
    pub max_batch_size: usize,

    /// Sleep between dispatches of the background loop.
    pub batch_request_delay: Duration,
}

impl<K> Default for LoaderOptions<K> {
    fn default() -> Self {
        LoaderOptions {
            cache_size: 256,
            sliding_expiration: Duration::ZERO,
            cache_key_resolver: None,
            disable_caching: false,
            disable_batching: false,
            max_batch_size: 0,
            batch_request_delay: Duration::ZERO,
        }
    }
}
