//! Cache keys
//!
//! One key identifies one decoded buffer result: the source URI plus the
//! parameter that distinguishes the decode, the size bound for still
//! images or the frame time for video thumbnails.

use std::fmt;
use std::sync::Arc;

use crate::native::MaxSize;

/// A single decode request.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferRequest {
    /// Decode a still image
    Image {
        uri: String,
        max_size: Option<MaxSize>,
    },
    /// Decode one frame of a video at `time` seconds
    VideoFrame {
        uri: String,
        time: f64,
        max_size: Option<MaxSize>,
    },
}

impl BufferRequest {
    pub fn image(uri: impl Into<String>, max_size: Option<MaxSize>) -> Self {
        Self::Image {
            uri: uri.into(),
            max_size,
        }
    }

    pub fn video_frame(uri: impl Into<String>, time: f64, max_size: Option<MaxSize>) -> Self {
        Self::VideoFrame {
            uri: uri.into(),
            time,
            max_size,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::Image { uri, .. } | Self::VideoFrame { uri, .. } => uri,
        }
    }

    /// Key identifying this request's decode result.
    ///
    /// Video keys carry the frame time but not the size bound: two
    /// thumbnail requests for the same frame coalesce even when their
    /// size hints differ.
    pub fn cache_key(&self) -> CacheKey {
        match self {
            Self::Image {
                uri,
                max_size: Some(size),
            } => CacheKey::from(format!("{uri}-{}x{}", size.width, size.height)),
            Self::Image {
                uri,
                max_size: None,
            } => CacheKey::from(format!("{uri}-full")),
            Self::VideoFrame { uri, time, .. } => CacheKey::from(format!("{uri}-t{time}")),
        }
    }
}

/// Composite identity of one decoded buffer. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_key_carries_size_bound() {
        let bounded = BufferRequest::image("file:///a.jpg", Some(MaxSize::new(100, 80)));
        let full = BufferRequest::image("file:///a.jpg", None);
        assert_eq!(bounded.cache_key().as_str(), "file:///a.jpg-100x80");
        assert_eq!(full.cache_key().as_str(), "file:///a.jpg-full");
        assert_ne!(bounded.cache_key(), full.cache_key());
    }

    #[test]
    fn video_key_carries_time_but_not_size() {
        let small = BufferRequest::video_frame("file:///b.mp4", 5.0, Some(MaxSize::new(100, 100)));
        let large = BufferRequest::video_frame("file:///b.mp4", 5.0, Some(MaxSize::new(500, 500)));
        let other_frame = BufferRequest::video_frame("file:///b.mp4", 6.5, None);
        assert_eq!(small.cache_key(), large.cache_key());
        assert_ne!(small.cache_key(), other_frame.cache_key());
    }
}
