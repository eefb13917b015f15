use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;

/// Batch fetch callback supplied by the user.
///
/// One call receives a chunk of distinct keys and returns a
/// value-or-error for each position in the chunk. Failing the call as
/// a whole rejects every key in the chunk.
#[async_trait]
pub trait Fetcher<K>: Send + Sync + 'static
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
{
    type Value: Send + Sync + Clone + 'static;
    type Error: Send + Sync + Clone + Debug + 'static;

    async fn fetch(
        &self,
        keys: &[K],
    ) -> Result<Vec<Result<Self::Value, Self::Error>>, Self::Error>;
}
