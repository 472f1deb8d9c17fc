//! Writable-readiness registration
//!
//! [`EventLoop`] is the only scheduling capability the streams rely on: a
//! [`Buffer`](crate::io::Buffer) with queued data registers a callback that
//! the loop invokes whenever the resource can take more bytes, and removes it
//! once its queue is empty.
//!
//! [`ReadyLoop`] is a manual implementation that treats every registered
//! resource as ready on each tick. Resources that cannot actually accept data
//! report so through their `write` (`WouldBlock`), which the buffer retries on
//! a later tick.
//!
//! # Workflow
//!
//! ```ignore
//! let event_loop = Arc::new(ReadyLoop::new());
//! let buffer = Buffer::new(resource, event_loop.clone());
//! source.pipe(buffer);
//! // ... source emits data ...
//! event_loop.run_until_idle(100);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Identity of a resource registered with an [`EventLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl Handle {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Fresh process-wide handle
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Callback invoked when a registered resource is writable
pub type WriteCallback = Arc<dyn Fn() + Send + Sync>;

pub trait EventLoop: Send + Sync {
    /// Call `callback` whenever the resource identified by `handle` is
    /// writable, until [`EventLoop::remove_write_stream`].
    fn add_write_stream(&self, handle: Handle, callback: WriteCallback);

    fn remove_write_stream(&self, handle: Handle);
}

#[derive(Default)]
struct LoopState {
    write_streams: BTreeMap<Handle, WriteCallback>,
    ticks: u64,
}

/// Manual readiness loop
#[derive(Clone, Default)]
pub struct ReadyLoop {
    inner: Arc<Mutex<LoopState>>,
}

impl ReadyLoop {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resources waiting for writable-readiness
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().write_streams.len()
    }

    #[must_use]
    pub fn is_registered(&self, handle: Handle) -> bool {
        self.inner.lock().write_streams.contains_key(&handle)
    }

    /// Ticks run since creation
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.inner.lock().ticks
    }

    /// Signal readiness to every registered resource once.
    ///
    /// Callbacks run without the loop lock held and may register or remove
    /// resources. A resource removed earlier in the same tick is skipped.
    /// Returns the number of callbacks run.
    pub fn tick(&self) -> usize {
        let snapshot: Vec<(Handle, WriteCallback)> = {
            let mut state = self.inner.lock();
            state.ticks += 1;
            state
                .write_streams
                .iter()
                .map(|(h, cb)| (*h, Arc::clone(cb)))
                .collect()
        };

        let mut ran = 0;
        for (handle, callback) in snapshot {
            if !self.is_registered(handle) {
                trace!(?handle, "loop.tick: skip resource removed during tick");
                continue;
            }
            callback();
            ran += 1;
        }
        ran
    }

    /// Tick until no resource is registered, at most `max_ticks` times.
    /// Returns the number of ticks run.
    pub fn run_until_idle(&self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && self.pending() > 0 {
            self.tick();
            ticks += 1;
        }
        if self.pending() > 0 {
            debug!(
                pending = self.pending(),
                max_ticks, "loop.run_until_idle: tick budget exhausted"
            );
        }
        ticks
    }

    /// Async flavour of [`ReadyLoop::run_until_idle`]: yields to the tokio
    /// scheduler between ticks so other tasks can feed the streams.
    pub async fn run(&self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && self.pending() > 0 {
            self.tick();
            ticks += 1;
            tokio::task::yield_now().await;
        }
        ticks
    }
}

impl EventLoop for ReadyLoop {
    fn add_write_stream(&self, handle: Handle, callback: WriteCallback) {
        let mut state = self.inner.lock();
        if state.write_streams.insert(handle, callback).is_some() {
            warn!(?handle, "loop.add_write_stream: resource already registered, callback replaced");
        } else {
            trace!(?handle, "loop.add_write_stream");
        }
    }

    fn remove_write_stream(&self, handle: Handle) {
        let mut state = self.inner.lock();
        if state.write_streams.remove(&handle).is_none() {
            debug!(?handle, "loop.remove_write_stream: resource not registered");
        } else {
            trace!(?handle, "loop.remove_write_stream");
        }
    }
}

impl fmt::Debug for ReadyLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ReadyLoop")
            .field("write_streams", &state.write_streams.keys().collect::<Vec<_>>())
            .field("ticks", &state.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_next_handles_are_unique() {
        let a = Handle::next();
        let b = Handle::next();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_tick_runs_each_registration_once() {
        let event_loop = ReadyLoop::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for id in 1..=2 {
            let calls = Arc::clone(&calls);
            event_loop.add_write_stream(
                Handle::new(id),
                Arc::new(move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        assert_eq!(event_loop.tick(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(event_loop.ticks(), 1);
    }

    #[test]
    fn test_callback_may_unregister_itself() {
        let event_loop = ReadyLoop::new();
        let handle = Handle::new(7);
        let lp = event_loop.clone();
        event_loop.add_write_stream(handle, Arc::new(move || lp.remove_write_stream(handle)));

        assert_eq!(event_loop.run_until_idle(10), 1);
        assert_eq!(event_loop.pending(), 0);
    }

    #[test]
    fn test_removed_during_tick_is_skipped() {
        let event_loop = ReadyLoop::new();
        let second_calls = Arc::new(AtomicUsize::new(0));
        let lp = event_loop.clone();
        event_loop.add_write_stream(
            Handle::new(1),
            Arc::new(move || lp.remove_write_stream(Handle::new(2))),
        );
        let calls = Arc::clone(&second_calls);
        event_loop.add_write_stream(
            Handle::new(2),
            Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(event_loop.tick(), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_until_idle_respects_budget() {
        let event_loop = ReadyLoop::new();
        event_loop.add_write_stream(Handle::new(1), Arc::new(|| {}));
        assert_eq!(event_loop.run_until_idle(5), 5);
        assert_eq!(event_loop.pending(), 1);
    }
}
