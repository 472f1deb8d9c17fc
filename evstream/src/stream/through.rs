//! Duplex pass-through stream
//!
//! Whatever is written comes out as `Data`, optionally mapped through a
//! filter. Useful as the middle stage of `pipe(a, pipe(through, c))`.

use std::fmt;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::emitter::{Emitter, Event, EventEmitter};
use crate::error::StreamError;
use crate::stream::{ReadableStream, WritableStream};

type Filter = Box<dyn Fn(Bytes) -> Bytes + Send + Sync>;

#[derive(Debug)]
struct ThroughState {
    readable: bool,
    writable: bool,
    paused: bool,
    closed: bool,
    /// A write was refused while paused; `Drain` is owed on resume
    drain: bool,
}

pub struct ThroughStream {
    emitter: Emitter,
    state: Mutex<ThroughState>,
    filter: Option<Filter>,
}

impl ThroughStream {
    #[must_use]
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new(),
            state: Mutex::new(ThroughState {
                readable: true,
                writable: true,
                paused: false,
                closed: false,
                drain: false,
            }),
            filter: None,
        }
    }

    /// Pass-through that maps every chunk with `filter`
    #[must_use]
    pub fn with_filter<F>(filter: F) -> Self
    where
        F: Fn(Bytes) -> Bytes + Send + Sync + 'static,
    {
        Self {
            filter: Some(Box::new(filter)),
            ..Self::new()
        }
    }
}

impl Default for ThroughStream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThroughStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ThroughStream")
            .field("readable", &state.readable)
            .field("writable", &state.writable)
            .field("paused", &state.paused)
            .field("closed", &state.closed)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl EventEmitter for ThroughStream {
    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

impl ReadableStream for ThroughStream {
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
        let drain = {
            let mut state = self.state.lock();
            state.paused = false;
            std::mem::take(&mut state.drain)
        };
        if drain {
            self.emitter.emit(&Event::Drain);
        }
    }

    fn close(&self) {
        WritableStream::close(self);
    }
}

impl WritableStream for ThroughStream {
    fn is_writable(&self) -> bool {
        self.state.lock().writable
    }

    fn write(&self, chunk: Bytes) -> bool {
        {
            let state = self.state.lock();
            if !state.writable {
                let closed = state.closed;
                drop(state);
                if !closed {
                    self.emitter.emit(&Event::Error(StreamError::NotWritable));
                }
                return false;
            }
        }

        let chunk = match &self.filter {
            Some(filter) => filter(chunk),
            None => chunk,
        };
        self.emitter.emit(&Event::Data(chunk));

        let mut state = self.state.lock();
        if state.paused {
            state.drain = true;
            false
        } else {
            true
        }
    }

    fn end(&self, chunk: Option<Bytes>) {
        if !self.is_writable() {
            return;
        }
        if let Some(chunk) = chunk {
            self.write(chunk);
        }
        {
            let mut state = self.state.lock();
            state.readable = false;
            state.writable = false;
            state.paused = false;
        }
        self.emitter.emit(&Event::End);
        WritableStream::close(self);
    }

    fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.readable = false;
            state.writable = false;
            state.drain = false;
        }
        self.emitter.emit(&Event::Close);
    }
}
