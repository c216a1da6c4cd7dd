//! Scripted native-module fake for cache tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BufferHandle, MaxSize, NativeBufferModule, NativeError};

/// Fake decode module: hands out sequential handles after a simulated
/// decode latency, records every load and unref it observes, and fails
/// any URI listed in `failing`.
pub(crate) struct FakeModule {
    delay: Duration,
    next_handle: AtomicI64,
    pub loads: Mutex<Vec<String>>,
    pub unreffed: Mutex<Vec<BufferHandle>>,
    pub failing: Mutex<HashSet<String>>,
}

impl FakeModule {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_handle: AtomicI64::new(1),
            loads: Mutex::new(Vec::new()),
            unreffed: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_uri(&self, uri: &str) {
        self.failing.lock().insert(uri.to_owned());
    }

    pub fn succeed_uri(&self, uri: &str) {
        self.failing.lock().remove(uri);
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().len()
    }

    pub fn unref_count(&self, handle: BufferHandle) -> usize {
        self.unreffed.lock().iter().filter(|h| **h == handle).count()
    }

    async fn decode(&self, call: String, uri: &str) -> Result<BufferHandle, NativeError> {
        self.loads.lock().push(call);
        tokio::time::sleep(self.delay).await;
        if self.failing.lock().contains(uri) {
            return Err(NativeError::LoadFailed {
                uri: uri.to_owned(),
                message: "decode failed".to_owned(),
            });
        }
        Ok(BufferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }
}

#[async_trait]
impl NativeBufferModule for FakeModule {
    async fn load_image(
        &self,
        uri: &str,
        _max_size: Option<MaxSize>,
    ) -> Result<BufferHandle, NativeError> {
        self.decode(format!("image:{uri}"), uri).await
    }

    async fn load_video_frame(
        &self,
        uri: &str,
        time: f64,
        _max_size: Option<MaxSize>,
    ) -> Result<BufferHandle, NativeError> {
        self.decode(format!("video:{uri}@{time}"), uri).await
    }

    fn unref_buffer(&self, handle: BufferHandle) {
        self.unreffed.lock().push(handle);
    }
}
