//! Buffered writable stream over a raw resource
//!
//! `write` never blocks. Data the resource cannot take right away is queued
//! and flushed later from the event loop's writable-readiness callback:
//!
//! ```text
//!        write() accepted in full
//!      +---------------------------+
//!      v                           |
//!    idle --(resource short)--> buffering --(queue empty: Drain)--> idle
//!      |                           |
//!      +--------(close)------------+--------> closed (terminal)
//! ```
//!
//! While buffering, `write` only appends to the queue and reports saturation,
//! which makes a pipe pause its source until `Drain`. `Drain` follows only a
//! write that reported saturation.
//!
//! # Lifetime
//!
//! The event loop registration owns the buffer. A buffer with queued data
//! therefore outlives every other handle to it and keeps flushing, including
//! a pending `end`. It is dropped, and closed, once the queue is empty and
//! nothing else refers to it.
//!
//! The buffer refers to its loop weakly. Dropping the last handle to the loop
//! drops its registrations, and with them every buffer only the loop owned.
//!
//! # Failures
//!
//! Short writes, `WouldBlock` and `Interrupted` are not failures. Any other
//! I/O error is retried on the next readiness callback; after
//! [`BufferOptions::max_write_failures`] consecutive errors the buffer emits
//! [`Event::Error`] and closes. Nothing is reported synchronously.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::resource::WriteResource;
use crate::emitter::{Emitter, Event, EventEmitter};
use crate::error::StreamError;
use crate::event_loop::{EventLoop, Handle, WriteCallback};
use crate::stream::WritableStream;

/// Buffer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    /// Queued bytes tolerated before `write` reports saturation.
    ///
    /// The default of 0 reports saturation as soon as anything is queued.
    pub soft_limit: usize,
    /// Consecutive resource errors before the buffer gives up
    pub max_write_failures: u32,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            soft_limit: 0,
            max_write_failures: 3,
        }
    }
}

struct BufferState<R> {
    resource: Option<R>,
    queue: VecDeque<Bytes>,
    queued: usize,
    listening: bool,
    writable: bool,
    closed: bool,
    end_pending: bool,
    refused: bool,
    failures: u32,
}

/// Result of one flush pass
enum Flush {
    /// Queue fully written
    Empty,
    /// Resource is short; retry on the next readiness callback
    Pending,
    /// Too many consecutive errors
    Failed(io::Error),
}

impl<R: WriteResource> BufferState<R> {
    /// Write queued chunks front to back until the queue is empty or the
    /// resource stops taking data. A partially written chunk keeps its
    /// remainder at the front.
    fn flush(&mut self, max_failures: u32) -> Flush {
        let Some(resource) = self.resource.as_mut() else {
            return Flush::Pending;
        };
        while let Some(front) = self.queue.front_mut() {
            let len = front.len();
            match resource.write(front) {
                Ok(0) => return Flush::Pending,
                Ok(n) if n < len => {
                    *front = front.slice(n..);
                    self.queued -= n;
                    self.failures = 0;
                    return Flush::Pending;
                }
                Ok(_) => {
                    self.queued -= len;
                    self.failures = 0;
                    self.queue.pop_front();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Flush::Pending,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.failures += 1;
                    if self.failures >= max_failures {
                        return Flush::Failed(e);
                    }
                    warn!(
                        failures = self.failures,
                        error = %e,
                        "buffer.flush: resource write failed, will retry"
                    );
                    return Flush::Pending;
                }
            }
        }
        Flush::Empty
    }
}

/// Writable stream that queues what its resource cannot take yet.
///
/// The buffer owns the resource exclusively and releases it on close.
pub struct Buffer<R: WriteResource> {
    handle: Handle,
    emitter: Emitter,
    event_loop: Weak<dyn EventLoop>,
    options: BufferOptions,
    state: Mutex<BufferState<R>>,
    weak_self: Weak<Self>,
}

impl<R: WriteResource> Buffer<R> {
    #[must_use]
    pub fn new(resource: R, event_loop: Arc<dyn EventLoop>) -> Arc<Self> {
        Self::with_options(resource, event_loop, BufferOptions::default())
    }

    #[must_use]
    pub fn with_options(
        resource: R,
        event_loop: Arc<dyn EventLoop>,
        options: BufferOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            handle: Handle::next(),
            emitter: Emitter::new(),
            event_loop: Arc::downgrade(&event_loop),
            options,
            state: Mutex::new(BufferState {
                resource: Some(resource),
                queue: VecDeque::new(),
                queued: 0,
                listening: false,
                writable: true,
                closed: false,
                end_pending: false,
                refused: false,
                failures: 0,
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// Handle under which the buffer registers with the event loop
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Bytes waiting to be flushed
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.state.lock().queued
    }

    /// True while waiting for writable-readiness
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        self.state.lock().listening
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Writable-readiness callback: flush as much as the resource takes.
    ///
    /// Once the queue is empty, stops listening, emits `Drain` if a write was
    /// refused meanwhile, and completes a pending `end`. Does nothing when not
    /// buffering.
    pub fn handle_write(&self) {
        let mut state = self.state.lock();
        if state.closed || !state.listening {
            return;
        }
        match state.flush(self.options.max_write_failures) {
            Flush::Pending => {
                trace!(handle = ?self.handle, queued = state.queued, "buffer.handle_write: still buffering");
            }
            Flush::Failed(e) => {
                drop(state);
                self.fail(e);
            }
            Flush::Empty => {
                state.listening = false;
                let end = state.end_pending;
                let drain = std::mem::replace(&mut state.refused, false);
                drop(state);
                self.unlisten();
                trace!(handle = ?self.handle, drain, "buffer.handle_write: drained");
                if drain {
                    self.emitter.emit(&Event::Drain);
                }
                if end {
                    self.close();
                }
            }
        }
    }

    fn listen(&self) {
        let Some(buffer) = self.weak_self.upgrade() else {
            return;
        };
        let Some(event_loop) = self.event_loop.upgrade() else {
            warn!(handle = ?self.handle, "buffer.listen: event loop is gone, queued data stays queued");
            return;
        };
        let callback: WriteCallback = Arc::new(move || buffer.handle_write());
        event_loop.add_write_stream(self.handle, callback);
    }

    fn unlisten(&self) {
        if let Some(event_loop) = self.event_loop.upgrade() {
            event_loop.remove_write_stream(self.handle);
        }
    }

    /// Report whether `queued` is within the soft limit, remembering a refusal
    fn accepts(&self, state: &mut BufferState<R>) -> bool {
        let accepted = state.queued <= self.options.soft_limit;
        if !accepted {
            state.refused = true;
        }
        accepted
    }

    fn fail(&self, err: io::Error) {
        warn!(handle = ?self.handle, error = %err, "buffer: giving up on resource");
        self.emitter.emit(&Event::Error(StreamError::write(err)));
        self.close();
    }
}

impl<R: WriteResource> fmt::Debug for Buffer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Buffer(handle={:?}, queued={}, chunks={}, listening={}, writable={}, closed={})",
            self.handle,
            state.queued,
            state.queue.len(),
            state.listening,
            state.writable,
            state.closed
        )
    }
}

impl<R: WriteResource> EventEmitter for Buffer<R> {
    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

impl<R: WriteResource> WritableStream for Buffer<R> {
    fn is_writable(&self) -> bool {
        self.state.lock().writable
    }

    fn write(&self, chunk: Bytes) -> bool {
        let mut state = self.state.lock();
        if !state.writable {
            let closed = state.closed;
            drop(state);
            debug!(handle = ?self.handle, closed, "buffer.write: not writable, chunk refused");
            if !closed {
                self.emitter.emit(&Event::Error(StreamError::NotWritable));
            }
            return false;
        }
        if chunk.is_empty() {
            return self.accepts(&mut state);
        }

        state.queued += chunk.len();
        state.queue.push_back(chunk);
        if state.listening {
            return self.accepts(&mut state);
        }

        match state.flush(self.options.max_write_failures) {
            Flush::Empty => true,
            Flush::Pending => {
                state.listening = true;
                let accepted = self.accepts(&mut state);
                drop(state);
                self.listen();
                accepted
            }
            Flush::Failed(e) => {
                drop(state);
                self.fail(e);
                false
            }
        }
    }

    fn end(&self, chunk: Option<Bytes>) {
        if !self.is_writable() {
            return;
        }
        if let Some(chunk) = chunk {
            self.write(chunk);
        }
        let close_now = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.writable = false;
            if state.queue.is_empty() {
                true
            } else {
                state.end_pending = true;
                false
            }
        };
        if close_now {
            self.close();
        }
    }

    fn close(&self) {
        let (resource, was_listening) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.writable = false;
            state.end_pending = false;
            if !state.queue.is_empty() {
                debug!(handle = ?self.handle, queued = state.queued, "buffer.close: discarding queued data");
            }
            state.queue.clear();
            state.queued = 0;
            (
                state.resource.take(),
                std::mem::replace(&mut state.listening, false),
            )
        };

        if was_listening {
            self.unlisten();
        }
        if let Some(mut resource) = resource {
            if let Err(e) = resource.close() {
                self.emitter.emit(&Event::Error(StreamError::close(e)));
            }
        }
        self.emitter.emit(&Event::Close);
    }
}

impl<R: WriteResource> Drop for Buffer<R> {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.close();
        }
    }
}
