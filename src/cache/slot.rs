//! Per-consumer buffer binding
//!
//! A slot mirrors one rendering consumer: it owns at most one cache
//! reference at a time, swaps it when the requested source changes, and
//! ignores load results that were superseded before they resolved.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::key::{BufferRequest, CacheKey};
use crate::cache::store::BufferCache;
use crate::cache::BufferError;
use crate::native::BufferHandle;

type LoadCallback = Arc<dyn Fn(BufferHandle) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&BufferError) + Send + Sync>;

struct SlotState {
    /// Bumped on every request change; a completion whose generation no
    /// longer matches was canceled and must not touch the slot.
    generation: u64,
    owned: Option<CacheKey>,
    displayed: Option<BufferHandle>,
}

/// Consumer-side binding to the cache.
///
/// Request changes must happen inside a tokio runtime: the completion of
/// each load is applied from a spawned task.
pub struct BufferSlot {
    cache: Arc<BufferCache>,
    state: Arc<Mutex<SlotState>>,
    on_load: Option<LoadCallback>,
    on_error: Option<ErrorCallback>,
}

impl BufferSlot {
    pub fn new(cache: Arc<BufferCache>) -> Self {
        Self {
            cache,
            state: Arc::new(Mutex::new(SlotState {
                generation: 0,
                owned: None,
                displayed: None,
            })),
            on_load: None,
            on_error: None,
        }
    }

    /// Called with the handle each time a load is applied to the slot.
    pub fn with_on_load(mut self, callback: impl Fn(BufferHandle) + Send + Sync + 'static) -> Self {
        self.on_load = Some(Arc::new(callback));
        self
    }

    /// Called when a still-current load fails.
    pub fn with_on_error(
        mut self,
        callback: impl Fn(&BufferError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Handle currently displayed by this slot, if any.
    pub fn handle(&self) -> Option<BufferHandle> {
        self.state.lock().displayed
    }

    /// Point the slot at a new source, or at nothing.
    ///
    /// The previously owned reference is released and the displayed
    /// handle cleared immediately, so stale content is never shown. The
    /// new load is applied only if it is still current when it resolves;
    /// a superseded load acquires no reference.
    pub fn set_request(&self, request: Option<BufferRequest>) {
        let generation;
        let previous = {
            let mut state = self.state.lock();
            state.generation += 1;
            generation = state.generation;
            state.displayed = None;
            state.owned.take()
        };
        if let Some(previous) = &previous {
            self.cache.release(previous);
        }
        let Some(request) = request else {
            return;
        };

        let mut pending = self.cache.load(&request);
        let cache = self.cache.clone();
        let state = self.state.clone();
        let on_load = self.on_load.clone();
        let on_error = self.on_error.clone();
        tokio::spawn(async move {
            loop {
                let key = pending.key().clone();
                match pending.wait().await {
                    Ok(handle) => match apply_resolution(&state, &cache, generation, key, handle)
                    {
                        ApplyOutcome::Applied => {
                            if let Some(on_load) = &on_load {
                                on_load(handle);
                            }
                            return;
                        }
                        ApplyOutcome::Superseded => return,
                        // The entry was swept between resolution and
                        // application, so the handle may already be freed
                        // natively. Load again instead of displaying it.
                        ApplyOutcome::Evicted => {
                            if state.lock().generation != generation {
                                return;
                            }
                            pending = cache.load(&request);
                        }
                    },
                    Err(error) => {
                        if state.lock().generation == generation {
                            if let Some(on_error) = &on_error {
                                on_error(&error);
                            }
                        }
                        return;
                    }
                }
            }
        });
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ApplyOutcome {
    Applied,
    Superseded,
    Evicted,
}

/// Attach a resolved handle to the slot. The generation check and retain
/// are atomic with respect to the next `set_request`; a superseded
/// request acquires no reference, and a handle whose entry was already
/// swept is never displayed.
fn apply_resolution(
    state: &Mutex<SlotState>,
    cache: &BufferCache,
    generation: u64,
    key: CacheKey,
    handle: BufferHandle,
) -> ApplyOutcome {
    let mut state = state.lock();
    if state.generation != generation {
        return ApplyOutcome::Superseded;
    }
    if !cache.retain(&key) {
        return ApplyOutcome::Evicted;
    }
    state.owned = Some(key);
    state.displayed = Some(handle);
    ApplyOutcome::Applied
}

impl Drop for BufferSlot {
    fn drop(&mut self) {
        let previous = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.displayed = None;
            state.owned.take()
        };
        if let Some(previous) = &previous {
            self.cache.release(previous);
        }
    }
}
