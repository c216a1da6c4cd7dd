#![deny(clippy::all)]

//! Reference-counted cache for natively decoded buffers
//!
//! This crate mediates access to decoded image and video-frame buffers
//! owned by a platform decode module: loads are coalesced per cache key,
//! consumers hold per-entry references through slots, and a debounced
//! janitor sweep returns unreferenced handles to the native layer. A
//! secondary registry keeps per-handle drawable wrappers and retires
//! them on a dedicated render thread.

// Contracts consumed from the native layer (decode module, drawable adapter)
pub mod native;

// Cache core (keys, coalesced loads, refcounts, sweep, consumer slots)
pub mod cache;

// Drawable registry pruned against the live-handle set
pub mod image;

// Re-export the working surface at crate root
pub use cache::{
    BufferCache, BufferError, BufferRequest, BufferResult, BufferSlot, CacheConfig, CacheKey,
    CacheStats, PendingLoad,
};
pub use image::{CachedImage, ImageRegistry, RenderThread};
pub use native::{
    BufferHandle, MaxSize, NativeBufferModule, NativeError, NativeImage, NativeImageFactory,
};
