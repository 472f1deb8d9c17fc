//! Duplex stream assembled from a readable half and a writable half

use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::emitter::{Emitter, Event, EventEmitter, EventKind};
use crate::forward::forward_events;
use crate::stream::{ReadableStream, WritableStream};

/// Events re-emitted from the readable half
const READABLE_EVENTS: &[EventKind] = &[EventKind::Data, EventKind::End, EventKind::Error];
/// Events re-emitted from the writable half
const WRITABLE_EVENTS: &[EventKind] = &[EventKind::Drain, EventKind::Error, EventKind::Pipe];

pub struct CompositeStream {
    emitter: Emitter,
    readable: Arc<dyn ReadableStream>,
    writable: Arc<dyn WritableStream>,
    closed: Mutex<bool>,
}

impl CompositeStream {
    /// Combine the halves. Closing either half closes the composite.
    pub fn new(
        readable: Arc<dyn ReadableStream>,
        writable: Arc<dyn WritableStream>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let emitter = Emitter::new();
            forward_events(readable.emitter(), &emitter, READABLE_EVENTS);
            forward_events(writable.emitter(), &emitter, WRITABLE_EVENTS);

            for half in [readable.emitter(), writable.emitter()] {
                let weak = weak.clone();
                half.on(EventKind::Close, move |_| {
                    if let Some(composite) = weak.upgrade() {
                        composite.shutdown();
                    }
                });
            }

            Self {
                emitter,
                readable,
                writable,
                closed: Mutex::new(false),
            }
        })
    }

    fn shutdown(&self) {
        {
            let mut closed = self.closed.lock();
            if *closed {
                return;
            }
            *closed = true;
        }
        self.readable.close();
        self.writable.close();
        self.emitter.emit(&Event::Close);
    }
}

impl fmt::Debug for CompositeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeStream")
            .field("readable", &self.readable.is_readable())
            .field("writable", &self.writable.is_writable())
            .field("closed", &*self.closed.lock())
            .finish()
    }
}

impl EventEmitter for CompositeStream {
    fn emitter(&self) -> &Emitter {
        &self.emitter
    }
}

impl ReadableStream for CompositeStream {
    fn is_readable(&self) -> bool {
        self.readable.is_readable()
    }

    fn is_paused(&self) -> bool {
        self.readable.is_paused()
    }

    fn pause(&self) {
        self.readable.pause();
    }

    fn resume(&self) {
        self.readable.resume();
    }

    fn close(&self) {
        self.shutdown();
    }
}

impl WritableStream for CompositeStream {
    fn is_writable(&self) -> bool {
        self.writable.is_writable()
    }

    fn write(&self, chunk: Bytes) -> bool {
        self.writable.write(chunk)
    }

    fn end(&self, chunk: Option<Bytes>) {
        self.writable.end(chunk);
    }

    fn close(&self) {
        self.shutdown();
    }
}
