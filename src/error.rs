//! Error types for the bucketcache library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Returned by all fallible cache operations and by the
//!   fallible builders.
//! - [`DynError`]: Boxed error type accepted from user-supplied loader and
//!   transform callbacks.
//!
//! Loader and transform failures carry the underlying cause and never mutate
//! cache state. `KeyNotFound` is the ordinary miss signal, not a fault.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Boxed error produced by user callbacks (loaders and transforms).
pub type DynError = Box<dyn Error + Send + Sync + 'static>;

/// Error returned by cache operations and builders.
///
/// The loader and transform variants share their cause through an `Arc` so
/// that a single failure can be broadcast to every coalesced waiter.
#[derive(Debug, Clone)]
pub enum CacheError {
    /// The key is not resident and no loader produced a value.
    KeyNotFound,
    /// A bounded policy was configured with capacity 0.
    CapacityInvalid,
    /// The loader callback returned an error; the cause is passed through.
    LoaderFailed(Arc<dyn Error + Send + Sync + 'static>),
    /// The serialize transform rejected a value on the store path.
    SerializeFailed(Arc<dyn Error + Send + Sync + 'static>),
    /// The deserialize transform rejected a value on the retrieve path.
    DeserializeFailed(Arc<dyn Error + Send + Sync + 'static>),
}

impl CacheError {
    /// Returns `true` for the ordinary miss signal.
    ///
    /// # Example
    ///
    /// ```
    /// use bucketcache::CacheError;
    ///
    /// assert!(CacheError::KeyNotFound.is_not_found());
    /// assert!(!CacheError::CapacityInvalid.is_not_found());
    /// ```
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::KeyNotFound)
    }

    pub(crate) fn loader_failed(cause: DynError) -> Self {
        CacheError::LoaderFailed(Arc::from(cause))
    }

    pub(crate) fn serialize_failed(cause: DynError) -> Self {
        CacheError::SerializeFailed(Arc::from(cause))
    }

    pub(crate) fn deserialize_failed(cause: DynError) -> Self {
        CacheError::DeserializeFailed(Arc::from(cause))
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::KeyNotFound => f.write_str("key not found"),
            CacheError::CapacityInvalid => {
                f.write_str("capacity must be greater than 0 for bounded policies")
            },
            CacheError::LoaderFailed(cause) => write!(f, "loader failed: {}", cause),
            CacheError::SerializeFailed(cause) => write!(f, "serialize failed: {}", cause),
            CacheError::DeserializeFailed(cause) => write!(f, "deserialize failed: {}", cause),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CacheError::LoaderFailed(cause)
            | CacheError::SerializeFailed(cause)
            | CacheError::DeserializeFailed(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}
