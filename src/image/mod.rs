//! Drawable registry
//!
//! Secondary cache mapping live buffer handles to host drawables, so the
//! same handle is never wrapped twice within one rendering context. The
//! registry is pruned by set-difference against the primary cache's live
//! handles; retired wrappers are disposed on a dedicated render thread
//! reached through a channel, never from the caller's thread.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::native::{BufferHandle, NativeImage, NativeImageFactory};

type RenderTask = Box<dyn FnOnce() + Send>;

/// Handle to the thread that owns drawable disposal.
///
/// Tasks are posted one-way; nothing is awaited. Dropping the handle
/// closes the channel, which lets the worker drain queued disposals and
/// exit.
pub struct RenderThread {
    sender: Option<Sender<RenderTask>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn() -> Self {
        let (sender, receiver) = channel::unbounded::<RenderTask>();
        let worker = std::thread::spawn(move || Self::worker_loop(receiver));
        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    fn worker_loop(receiver: Receiver<RenderTask>) {
        while let Ok(task) = receiver.recv() {
            task();
        }
    }

    /// Queue `task` onto the render thread.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(task));
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Registry entry: one wrapped drawable, disposed at most once.
pub struct CachedImage {
    handle: BufferHandle,
    image: Mutex<Option<Box<dyn NativeImage>>>,
}

impl CachedImage {
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Borrow the wrapper, if it has not been disposed yet.
    pub fn with_image<R>(&self, f: impl FnOnce(&mut dyn NativeImage) -> R) -> Option<R> {
        self.image.lock().as_mut().map(|image| f(image.as_mut()))
    }

    /// Runs on the render thread. A disposal failure is logged and never
    /// propagated.
    fn dispose(&self) {
        if let Some(mut image) = self.image.lock().take() {
            if let Err(error) = image.dispose() {
                tracing::warn!(
                    target: "buffer_cache",
                    "failed to dispose drawable for buffer {}: {}",
                    self.handle.0,
                    error
                );
            }
        }
    }
}

/// Per-handle drawable cache.
pub struct ImageRegistry {
    factory: Box<dyn NativeImageFactory>,
    images: Mutex<HashMap<BufferHandle, Arc<CachedImage>>>,
    render: RenderThread,
}

impl ImageRegistry {
    pub fn new(factory: impl NativeImageFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            images: Mutex::new(HashMap::new()),
            render: RenderThread::spawn(),
        }
    }

    /// Wrapper for `handle`, built on first use.
    ///
    /// A wrapping failure is logged as a warning and yields `None`;
    /// callers are expected to render a placeholder instead.
    pub fn image_for(&self, handle: BufferHandle) -> Option<Arc<CachedImage>> {
        let mut images = self.images.lock();
        if let Some(image) = images.get(&handle) {
            return Some(image.clone());
        }
        match self.factory.make_image(handle) {
            Ok(image) => {
                let cached = Arc::new(CachedImage {
                    handle,
                    image: Mutex::new(Some(image)),
                });
                images.insert(handle, cached.clone());
                Some(cached)
            }
            Err(error) => {
                tracing::warn!(
                    target: "buffer_cache",
                    "failed to wrap buffer {} as image: {}",
                    handle.0,
                    error
                );
                None
            }
        }
    }

    /// Retire every wrapper whose handle is no longer in `live`.
    ///
    /// Disposal happens on the render thread; one failure does not stop
    /// the rest of the batch.
    pub fn prune(&self, live: &[BufferHandle]) {
        let stale: Vec<Arc<CachedImage>> = {
            let mut images = self.images.lock();
            let dead: Vec<BufferHandle> = images
                .keys()
                .filter(|handle| !live.contains(handle))
                .copied()
                .collect();
            dead.into_iter()
                .filter_map(|handle| images.remove(&handle))
                .collect()
        };
        if stale.is_empty() {
            return;
        }
        self.render.post(move || {
            for image in stale {
                image.dispose();
            }
        });
    }

    pub fn len(&self) -> usize {
        self.images.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.lock().is_empty()
    }
}
