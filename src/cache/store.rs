//! Buffer cache core
//!
//! Entries hold `{ handle, ref_count }` keyed by [`CacheKey`]. Concurrent
//! loads for one key are coalesced onto a single native call; reclamation
//! is a trailing-debounced sweep that frees zero-refcount entries and
//! prunes the drawable registry against the surviving handles.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{select, Either};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::cache::key::{BufferRequest, CacheKey};
use crate::cache::{BufferError, BufferResult, CacheConfig};
use crate::image::ImageRegistry;
use crate::native::{BufferHandle, NativeBufferModule};

/// Cache activity counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Load requests received
    pub requests: u64,
    /// Requests answered from an existing entry
    pub hits: u64,
    /// Requests merged into an already in-flight load
    pub coalesced: u64,
    /// Native loads issued
    pub loads: u64,
    /// Native loads that failed
    pub load_failures: u64,
    /// Entries reclaimed by sweeps
    pub evictions: u64,
}

struct Entry {
    handle: BufferHandle,
    ref_count: u32,
}

type Waiter = oneshot::Sender<BufferResult<BufferHandle>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    in_flight: HashMap<CacheKey, Vec<Waiter>>,
    stats: CacheStats,
    closed: bool,
}

struct CacheInner {
    backend: Arc<dyn NativeBufferModule>,
    images: Option<Arc<ImageRegistry>>,
    state: Mutex<CacheState>,
    sweep_signal: Arc<Notify>,
}

/// Reference-counted cache over native buffer handles.
///
/// Must be created inside a tokio runtime: construction spawns the
/// janitor task and cache misses spawn the native load. Dropping the
/// cache stops the janitor and returns every remaining handle to the
/// native module.
pub struct BufferCache {
    inner: Arc<CacheInner>,
    janitor: JoinHandle<()>,
}

impl BufferCache {
    pub fn new(backend: Arc<dyn NativeBufferModule>) -> Self {
        Self::with_config(backend, CacheConfig::default(), None)
    }

    pub fn with_config(
        backend: Arc<dyn NativeBufferModule>,
        config: CacheConfig,
        images: Option<Arc<ImageRegistry>>,
    ) -> Self {
        let sweep_signal = Arc::new(Notify::new());
        let inner = Arc::new(CacheInner {
            backend,
            images,
            state: Mutex::new(CacheState::default()),
            sweep_signal: sweep_signal.clone(),
        });
        let janitor = tokio::spawn(janitor_loop(
            Arc::downgrade(&inner),
            sweep_signal,
            config.sweep_delay,
        ));
        Self { inner, janitor }
    }

    /// Start (or join) a load for `request`.
    ///
    /// The returned [`PendingLoad`] resolves immediately on a cache hit,
    /// joins the in-flight load when one exists for the same key, and
    /// otherwise issues exactly one native load.
    pub fn load(&self, request: &BufferRequest) -> PendingLoad {
        let key = request.cache_key();
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.state.lock();
        state.stats.requests += 1;
        if let Some(handle) = state.entries.get(&key).map(|entry| entry.handle) {
            state.stats.hits += 1;
            drop(state);
            let _ = tx.send(Ok(handle));
            // A hit is a successful load: restart the quiet window so the
            // entry stays acquirable while the result is delivered.
            self.inner.sweep_signal.notify_one();
            return PendingLoad { key, rx };
        }
        if let Some(waiters) = state.in_flight.get_mut(&key) {
            waiters.push(tx);
            state.stats.coalesced += 1;
            return PendingLoad { key, rx };
        }
        state.stats.loads += 1;
        state.in_flight.insert(key.clone(), vec![tx]);
        drop(state);
        tokio::spawn(run_load(self.inner.clone(), key.clone(), request.clone()));
        PendingLoad { key, rx }
    }

    /// Take a reference on `key`.
    ///
    /// Returns whether a reference was taken: `false` means no entry
    /// exists for the key, and a swept entry cannot be resurrected, so
    /// callers holding a resolved handle must treat it as a miss and
    /// load again.
    pub fn retain(&self, key: &CacheKey) -> bool {
        let retained = {
            let mut state = self.inner.state.lock();
            match state.entries.get_mut(key) {
                Some(entry) => {
                    entry.ref_count += 1;
                    true
                }
                None => false,
            }
        };
        self.inner.sweep_signal.notify_one();
        retained
    }

    /// Drop a reference on `key`, saturating at zero. No-op if absent.
    pub fn release(&self, key: &CacheKey) {
        {
            let mut state = self.inner.state.lock();
            if let Some(entry) = state.entries.get_mut(key) {
                entry.ref_count = entry.ref_count.saturating_sub(1);
            }
        }
        self.inner.sweep_signal.notify_one();
    }

    /// Handle currently cached for `key`, if any.
    pub fn handle_for(&self, key: &CacheKey) -> Option<BufferHandle> {
        self.inner.state.lock().entries.get(key).map(|e| e.handle)
    }

    /// Reference count for `key`, or `None` if no entry exists.
    pub fn ref_count(&self, key: &CacheKey) -> Option<u32> {
        self.inner.state.lock().entries.get(key).map(|e| e.ref_count)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.state.lock().stats
    }
}

impl Drop for BufferCache {
    fn drop(&mut self) {
        self.janitor.abort();
        self.inner.drain();
    }
}

impl CacheInner {
    /// Record a finished native load: resolve every coalesced waiter and,
    /// on success, install the entry with a zero refcount and schedule a
    /// sweep so it cannot outlive disinterest forever.
    fn finish_load(&self, key: &CacheKey, result: BufferResult<BufferHandle>) {
        let waiters = {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                // Drained while we were decoding: give the fresh handle
                // straight back instead of leaking it.
                if let Ok(handle) = &result {
                    self.backend.unref_buffer(*handle);
                }
                return;
            }
            let waiters = state.in_flight.remove(key).unwrap_or_default();
            match &result {
                Ok(handle) => {
                    state.entries.insert(
                        key.clone(),
                        Entry {
                            handle: *handle,
                            ref_count: 0,
                        },
                    );
                }
                Err(_) => state.stats.load_failures += 1,
            }
            waiters
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        if result.is_ok() {
            self.sweep_signal.notify_one();
        }
    }

    /// Reclaim every zero-refcount entry, then retire drawables for
    /// handles that are no longer live.
    fn sweep(&self) {
        let mut released = Vec::new();
        let mut live = Vec::new();
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.entries.retain(|key, entry| {
                if entry.ref_count == 0 {
                    released.push((key.clone(), entry.handle));
                    false
                } else {
                    live.push(entry.handle);
                    true
                }
            });
            state.stats.evictions += released.len() as u64;
        }
        for (key, handle) in &released {
            tracing::debug!(
                target: "buffer_cache",
                "sweep releasing unreferenced buffer {} for {}",
                handle.0,
                key
            );
            self.backend.unref_buffer(*handle);
        }
        if let Some(images) = &self.images {
            images.prune(&live);
        }
    }

    /// Fail every in-flight waiter and return every entry's handle to the
    /// native module. Loads that complete after this see `closed` and
    /// unref their own result.
    fn drain(&self) {
        let (entries, waiters) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let entries = std::mem::take(&mut state.entries);
            let waiters: Vec<Waiter> = state
                .in_flight
                .drain()
                .flat_map(|(_, waiters)| waiters)
                .collect();
            (entries, waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(Err(BufferError::Canceled));
        }
        for entry in entries.into_values() {
            self.backend.unref_buffer(entry.handle);
        }
    }
}

async fn run_load(inner: Arc<CacheInner>, key: CacheKey, request: BufferRequest) {
    let result = match &request {
        BufferRequest::Image { uri, max_size } => inner.backend.load_image(uri, *max_size).await,
        BufferRequest::VideoFrame {
            uri,
            time,
            max_size,
        } => inner.backend.load_video_frame(uri, *time, *max_size).await,
    };
    inner.finish_load(&key, result.map_err(BufferError::from));
}

/// Trailing debounce: wait for a cache event, restart the quiet period on
/// every further event, and sweep once the cache has been quiet for the
/// full delay. Sweeps are global, not per-key.
async fn janitor_loop(inner: Weak<CacheInner>, signal: Arc<Notify>, delay: Duration) {
    loop {
        signal.notified().await;
        loop {
            let quiet = pin!(sleep(delay));
            let wake = pin!(signal.notified());
            match select(quiet, wake).await {
                Either::Left(_) => break,
                Either::Right(_) => {}
            }
        }
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.sweep();
    }
}

/// A load started by [`BufferCache::load`].
///
/// The key is available immediately; the handle once the native load (or
/// the in-flight load this request joined) resolves.
pub struct PendingLoad {
    key: CacheKey,
    rx: oneshot::Receiver<BufferResult<BufferHandle>>,
}

impl PendingLoad {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Wait for the load to resolve.
    ///
    /// Dropping a `PendingLoad` instead of waiting abandons the result;
    /// the underlying native load is not aborted.
    pub async fn wait(self) -> BufferResult<BufferHandle> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(BufferError::Canceled),
        }
    }
}
