//! Contracts consumed from the native layer
//!
//! The cache never decodes anything and never owns pixel memory. Decoded
//! buffers live in the platform decode module and are referenced through
//! opaque 64-bit handles; drawables are minted from those handles by the
//! host rendering adapter. Both collaborators are reached through the
//! traits below so the cache can be exercised against fakes.

use async_trait::async_trait;

#[cfg(test)]
pub(crate) mod testing;

/// Opaque token for a native-owned decoded buffer.
///
/// The token is only meaningful to the module that issued it; the cache
/// stores and forwards it without inspecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub i64);

/// Maximum decode size hint forwarded to the native loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaxSize {
    /// Maximum width in pixels
    pub width: u32,
    /// Maximum height in pixels
    pub height: u32,
}

impl MaxSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Native layer error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum NativeError {
    /// The decode module reported an explicit error for this source
    #[error("native load failed for {uri}: {message}")]
    LoadFailed { uri: String, message: String },

    /// The decode module completed without producing a buffer
    #[error("native load produced no buffer for {uri}")]
    EmptyResult { uri: String },

    /// The rendering adapter failed to wrap or dispose a drawable
    #[error("drawable adapter error: {0}")]
    Adapter(String),
}

/// Platform decode module.
///
/// Each load call resolves exactly once, with a handle or an error. Every
/// handle returned here must eventually be given back through
/// [`unref_buffer`](NativeBufferModule::unref_buffer); the cache takes
/// care of that for the entries it manages.
#[async_trait]
pub trait NativeBufferModule: Send + Sync {
    /// Decode a still image, optionally bounded by `max_size`.
    async fn load_image(
        &self,
        uri: &str,
        max_size: Option<MaxSize>,
    ) -> Result<BufferHandle, NativeError>;

    /// Decode one video frame at `time` seconds, optionally bounded by `max_size`.
    async fn load_video_frame(
        &self,
        uri: &str,
        time: f64,
        max_size: Option<MaxSize>,
    ) -> Result<BufferHandle, NativeError>;

    /// Release a handle previously returned by one of the load calls.
    fn unref_buffer(&self, handle: BufferHandle);
}

/// Drawable wrapper built from a native buffer handle.
pub trait NativeImage: Send {
    /// Release the drawable's host resources.
    ///
    /// Only ever called on the render thread, at most once.
    fn dispose(&mut self) -> Result<(), NativeError>;
}

/// Synchronous adapter minting drawables from handles.
pub trait NativeImageFactory: Send + Sync {
    /// Wrap `handle` for rendering.
    fn make_image(&self, handle: BufferHandle) -> Result<Box<dyn NativeImage>, NativeError>;
}
