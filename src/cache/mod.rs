//! Reference-counted buffer cache
//!
//! Bookkeeping over native decode results: loads for the same key are
//! coalesced onto one native call, consumers hold per-entry references,
//! and a debounced sweep returns unreferenced handles to the native layer.

pub mod key;
mod slot;
mod store;

pub use key::{BufferRequest, CacheKey};
pub use slot::BufferSlot;
pub use store::{BufferCache, CacheStats, PendingLoad};

use std::time::Duration;

use crate::native::NativeError;

/// Cache error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum BufferError {
    /// The native layer failed to produce or wrap a buffer
    #[error(transparent)]
    Native(#[from] NativeError),

    /// The cache was dropped while this load was still in flight
    #[error("buffer load canceled")]
    Canceled,
}

pub type BufferResult<T> = Result<T, BufferError>;

/// Cache tuning knobs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Quiet period after the last cache event before a reclamation sweep
    /// runs. Unreferenced buffers can stay resident for up to this long,
    /// which keeps rapid mount/unmount cycles from thrashing the decoder.
    pub sweep_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_delay: Duration::from_secs(1),
        }
    }
}
