//! Minimal concrete streams
//!
//! [`ReadableStreamBase`] is a push source: the owner hands it chunks with
//! [`ReadableStreamBase::push`]. Chunks pushed while paused are held back and
//! replayed in order on resume, so pausing never loses data.
//!
//! [`WritableStreamBase`] accepts every chunk and keeps it for inspection.

use std::collections::VecDeque;
use std::fmt;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::emitter::{Emitter, Event, EventEmitter};
use crate::error::StreamError;
use crate::stream::{ReadableStream, WritableStream};

#[derive(Debug)]
struct ReadableState {
    readable: bool,
    paused: bool,
    closed: bool,
    held: VecDeque<Bytes>,
    end_held: bool,
    replaying: bool,
}

pub struct ReadableStreamBase {
    emitter: Emitter,
    state: Mutex<ReadableState>,
}

impl ReadableStreamBase {
    #[must_use]
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new(),
            state: Mutex::new(ReadableState {
                readable: true,
                paused: false,
                closed: false,
                held: VecDeque::new(),
                end_held: false,
                replaying: false,
            }),
        }
    }

    /// Produce a chunk.
    ///
    /// Returns false if the chunk was held back (paused) or dropped (no longer
    /// readable), true if it was emitted and the stream is still flowing.
    pub fn push(&self, chunk: impl Into<Bytes>) -> bool {
        let chunk = chunk.into();
        {
            let mut state = self.state.lock();
            if !state.readable || state.end_held {
                log::debug!("ReadableStreamBase::push() after end, chunk dropped");
                return false;
            }
            if state.paused || !state.held.is_empty() {
                state.held.push_back(chunk);
                return false;
            }
        }
        self.emitter.emit(&Event::Data(chunk));
        !self.is_paused()
    }

    /// Finish gracefully: emit `End`, then `Close`.
    ///
    /// With chunks still held back, the end is deferred until they have
    /// been replayed.
    pub fn end(&self) {
        {
            let mut state = self.state.lock();
            if !state.readable {
                return;
            }
            if !state.held.is_empty() {
                state.end_held = true;
                return;
            }
            state.readable = false;
        }
        self.emitter.emit(&Event::End);
        self.close();
    }

    /// Number of chunks held back while paused
    #[must_use]
    pub fn held_len(&self) -> usize {
        self.state.lock().held.len()
    }

    fn replay(&self) {
        {
            let mut state = self.state.lock();
            if state.replaying {
                return;
            }
            state.replaying = true;
        }
        loop {
            let next = {
                let mut state = self.state.lock();
                if state.paused {
                    None
                } else {
                    state.held.pop_front()
                }
            };
            match next {
                Some(chunk) => {
                    self.emitter.emit(&Event::Data(chunk));
                }
                None => break,
            }
        }
        let finish = {
            let mut state = self.state.lock();
            state.replaying = false;
            let finish = state.end_held && state.held.is_empty();
            if finish {
                state.end_held = false;
            }
            finish
        };
        if finish {
            self.end();
        }
    }
}

impl Default for ReadableStreamBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadableStreamBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "ReadableStreamBase(readable={}, paused={}, closed={}, held={})",
            state.readable,
            state.paused,
            state.closed,
            state.held.len()
        )
    }
}

impl EventEmitter for ReadableStreamBase {
    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

impl ReadableStream for ReadableStreamBase {
    fn is_readable(&self) -> bool {
        self.state.lock().readable
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn resume(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.paused = false;
        }
        self.replay();
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.readable = false;
            state.end_held = false;
            state.held.clear();
        }
        self.emitter.emit(&Event::Close);
    }
}

#[derive(Debug)]
struct WritableState {
    writable: bool,
    closed: bool,
    chunks: Vec<Bytes>,
}

/// Writable stream that accepts everything and remembers it
pub struct WritableStreamBase {
    emitter: Emitter,
    state: Mutex<WritableState>,
}

impl WritableStreamBase {
    #[must_use]
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new(),
            state: Mutex::new(WritableState {
                writable: true,
                closed: false,
                chunks: Vec::new(),
            }),
        }
    }

    /// Chunks accepted so far, in write order
    #[must_use]
    pub fn chunks(&self) -> Vec<Bytes> {
        self.state.lock().chunks.clone()
    }

    /// All accepted data concatenated
    #[must_use]
    pub fn contents(&self) -> Bytes {
        let state = self.state.lock();
        let mut buf = BytesMut::new();
        for chunk in &state.chunks {
            buf.extend_from_slice(chunk);
        }
        buf.freeze()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for WritableStreamBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WritableStreamBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "WritableStreamBase(writable={}, closed={}, chunks={})",
            state.writable,
            state.closed,
            state.chunks.len()
        )
    }
}

impl EventEmitter for WritableStreamBase {
    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

impl WritableStream for WritableStreamBase {
    fn is_writable(&self) -> bool {
        self.state.lock().writable
    }

    fn write(&self, chunk: Bytes) -> bool {
        let mut state = self.state.lock();
        if !state.writable {
            let closed = state.closed;
            drop(state);
            if !closed {
                self.emitter.emit(&Event::Error(StreamError::NotWritable));
            }
            return false;
        }
        state.chunks.push(chunk);
        true
    }

    fn end(&self, chunk: Option<Bytes>) {
        if let Some(chunk) = chunk {
            self.write(chunk);
        }
        self.state.lock().writable = false;
        self.close();
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.writable = false;
        }
        self.emitter.emit(&Event::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::emitter::EventKind;

    #[test]
    fn test_push_emits_data_when_flowing() {
        let source = ReadableStreamBase::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = Arc::clone(&seen);
        source.emitter().on(EventKind::Data, move |event| {
            if let Event::Data(chunk) = event {
                seen_c.lock().push(chunk.clone());
            }
        });

        assert!(source.push("a"));
        assert!(source.push("b"));
        assert_eq!(*seen.lock(), vec![Bytes::from("a"), Bytes::from("b")]);
    }

    #[test]
    fn test_paused_push_is_held_and_replayed_in_order() {
        let source = ReadableStreamBase::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_c = Arc::clone(&seen);
        source.emitter().on(EventKind::Data, move |event| {
            if let Event::Data(chunk) = event {
                seen_c.lock().push(chunk.clone());
            }
        });

        source.pause();
        assert!(!source.push("1"));
        assert!(!source.push("2"));
        assert_eq!(source.held_len(), 2);
        assert!(seen.lock().is_empty());

        source.resume();
        assert_eq!(source.held_len(), 0);
        assert_eq!(*seen.lock(), vec![Bytes::from("1"), Bytes::from("2")]);
    }

    #[test]
    fn test_end_waits_for_held_chunks() {
        let source = ReadableStreamBase::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::Data, EventKind::End, EventKind::Close] {
            let events = Arc::clone(&events);
            source.emitter().on(kind, move |event| events.lock().push(event.kind()));
        }

        source.pause();
        source.push("x");
        source.end();
        assert!(source.is_readable());
        assert!(events.lock().is_empty());

        source.resume();
        assert_eq!(
            *events.lock(),
            vec![EventKind::Data, EventKind::End, EventKind::Close]
        );
        assert!(!source.is_readable());
    }

    #[test]
    fn test_close_is_idempotent() {
        let source = ReadableStreamBase::new();
        let closes = Arc::new(Mutex::new(0));
        let closes_c = Arc::clone(&closes);
        source
            .emitter()
            .on(EventKind::Close, move |_| *closes_c.lock() += 1);
        source.close();
        source.close();
        assert_eq!(*closes.lock(), 1);
        assert!(!source.push("late"));
    }

    #[test]
    fn test_writable_records_and_rejects_after_end() {
        let sink = WritableStreamBase::new();
        let errors = Arc::new(Mutex::new(0));
        let errors_c = Arc::clone(&errors);
        sink.emitter()
            .on(EventKind::Error, move |_| *errors_c.lock() += 1);

        assert!(sink.write(Bytes::from("ab")));
        sink.end(Some(Bytes::from("c")));
        assert_eq!(sink.contents(), Bytes::from("abc"));
        assert!(sink.is_closed());

        // closed: silently refused
        assert!(!sink.write(Bytes::from("d")));
        assert_eq!(*errors.lock(), 0);
    }
}
