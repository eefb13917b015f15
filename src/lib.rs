//! Request-coalescing loader for high-latency backing stores: clustered
//! single-key lookups are folded into few multi-key fetches, and every
//! key is fetched at most once per instance while its promise is cached.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod loader;
pub mod options;
mod pending;
pub mod promise;

pub use cache::TaskCache;
pub use error::{Error, LoadError, LoadResult, Result};
pub use fetcher::Fetcher;
pub use loader::{DataLoader, LoadFuture};
pub use options::{CacheKeyResolver, LoaderOptions};
pub use promise::{Promise, PromiseFuture};
