/// Errors surfaced synchronously by loader operations.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("keys must not be empty")]
    EmptyKeys,

    #[error("loader has been disposed")]
    Disposed,

    #[error("promise has already been settled")]
    AlreadySettled,
}

pub type Result<A, E = Error> = std::result::Result<A, E>;

/// Per-key failure, observed only through the future returned by a load.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError<E> {
    #[error("batch fetch failed: {0}")]
    Fetch(E),

    #[error("batch returned {returned} results for {expected} keys")]
    ShapeMismatch { expected: usize, returned: usize },
}

/// What a settled load resolves to: the fetched value or the failure
/// that rejected it.
pub type LoadResult<V, E> = std::result::Result<V, LoadError<E>>;
