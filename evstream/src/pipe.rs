//! Pipe a readable stream into a writable stream with backpressure
//!
//! A pipe binding is nothing but a handful of listener registrations:
//!
//! ```text
//!   source                              destination
//!   ------                              -----------
//!   Data  --(write; pause if refused)-->  write()
//!   End   --(only with `end: true`)---->  end()
//!   resume() <---------------------------  Drain
//!   Close --\                        /--  Close
//!            `--> cleanup (once) <--'
//! ```
//!
//! The cleanup removes exactly the registrations made by its own binding, so
//! several pipes on the same source (fan-out) and foreign listeners are left
//! untouched.
//!
//! # Ownership
//!
//! The source's `Data` and `End` handlers hold the destination strongly: an
//! active pipe keeps its sink alive. Handlers registered on the destination
//! hold the source, and the destination's own listener set, weakly, so
//! dropping both endpoints frees the binding even if neither ever closed.
//! A [`Buffer`](crate::io::Buffer) still flushing after its source closed is
//! kept alive by its event loop registration.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::emitter::{Emitter, Event, EventKind, ListenerId};
use crate::stream::{ReadableStream, WritableStream};

/// Pipe configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    /// Forward the source's `End` to `destination.end()`
    pub end: bool,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self { end: true }
    }
}

impl PipeOptions {
    /// Leave the destination open after the source ends
    #[must_use]
    pub fn keep_open() -> Self {
        Self { end: false }
    }
}

/// Registrations of one binding, filled in as they are made
#[derive(Debug, Default)]
struct Binding {
    data: Option<ListenerId>,
    end: Option<ListenerId>,
    drain: Option<ListenerId>,
    source_close: Option<ListenerId>,
    dest_close: Option<ListenerId>,
    torn_down: bool,
}

/// Pipe `source` into `dest` and return `dest`.
///
/// Does nothing at all when the source is no longer readable. Otherwise every
/// `Data` chunk is written to the destination; the source is paused whenever
/// the destination is not writable or refuses a write, and resumed on the
/// destination's `Drain`. A stalled destination keeps the source paused
/// indefinitely.
pub fn pipe<S, D>(source: &Arc<S>, dest: Arc<D>, options: PipeOptions) -> Arc<D>
where
    S: ReadableStream + ?Sized + 'static,
    D: WritableStream + ?Sized + 'static,
{
    if !source.is_readable() {
        log::debug!("pipe: source is not readable, nothing to wire");
        return dest;
    }

    dest.emit(&Event::Pipe);

    let binding = Arc::new(Mutex::new(Binding::default()));
    let weak_source: Weak<S> = Arc::downgrade(source);

    let data_id = {
        let weak_source = weak_source.clone();
        let dest = Arc::clone(&dest);
        source.emitter().on(EventKind::Data, move |event| {
            let Event::Data(chunk) = event else {
                return;
            };
            let Some(source) = weak_source.upgrade() else {
                return;
            };
            if !dest.is_writable() {
                log::debug!("pipe: destination not writable, pausing source");
                source.pause();
                return;
            }
            if !dest.write(chunk.clone()) {
                source.pause();
            }
        })
    };

    let drain_id = {
        let weak_source = weak_source.clone();
        dest.emitter().on(EventKind::Drain, move |_| {
            if let Some(source) = weak_source.upgrade() {
                source.resume();
            }
        })
    };

    let end_id = options.end.then(|| {
        let dest = Arc::clone(&dest);
        source.emitter().on(EventKind::End, move |_| dest.end(None))
    });

    {
        let mut b = binding.lock();
        b.data = Some(data_id);
        b.drain = Some(drain_id);
        b.end = end_id;
    }

    let source_close_id = {
        let binding = Arc::clone(&binding);
        let weak_source = weak_source.clone();
        let dest_emitter = dest.emitter().clone();
        source.emitter().on(EventKind::Close, move |_| {
            let source = weak_source.upgrade();
            teardown(&binding, source.as_ref().map(|s| s.emitter()), &dest_emitter);
        })
    };

    let dest_close_id = {
        let binding = Arc::clone(&binding);
        let weak_dest = dest.emitter().downgrade();
        dest.emitter().on(EventKind::Close, move |_| {
            let Some(dest_emitter) = weak_dest.upgrade() else {
                return;
            };
            let source = weak_source.upgrade();
            let first = teardown(&binding, source.as_ref().map(|s| s.emitter()), &dest_emitter);
            if let (true, Some(source)) = (first, source) {
                source.pause();
            }
        })
    };

    {
        let mut b = binding.lock();
        b.source_close = Some(source_close_id);
        b.dest_close = Some(dest_close_id);
    }

    dest
}

/// Remove every registration of the binding. Returns false if it already ran.
///
/// `source` is `None` when the source has been dropped; its listener set went
/// with it.
fn teardown(binding: &Mutex<Binding>, source: Option<&Emitter>, dest: &Emitter) -> bool {
    let b = {
        let mut guard = binding.lock();
        if guard.torn_down {
            return false;
        }
        let b = std::mem::take(&mut *guard);
        guard.torn_down = true;
        b
    };

    if let Some(source) = source {
        if let Some(id) = b.data {
            source.remove_listener(EventKind::Data, id);
        }
        if let Some(id) = b.end {
            source.remove_listener(EventKind::End, id);
        }
        if let Some(id) = b.source_close {
            source.remove_listener(EventKind::Close, id);
        }
    }
    if let Some(id) = b.drain {
        dest.remove_listener(EventKind::Drain, id);
    }
    if let Some(id) = b.dest_close {
        dest.remove_listener(EventKind::Close, id);
    }
    log::debug!("pipe: binding torn down");
    true
}
