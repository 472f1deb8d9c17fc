//! Event-driven streams with backpressure-aware piping
//!
//! A [`ReadableStream`] emits chunks as [`Event::Data`]; a [`WritableStream`]
//! accepts them through a non-blocking `write` that reports saturation.
//! [`pipe()`] wires one into the other and pauses the source whenever the
//! destination falls behind, resuming it on [`Event::Drain`].
//!
//! [`io::Buffer`] is the writable stream that turns a raw, possibly slow
//! resource into such a sink, flushing from an [`EventLoop`]'s
//! writable-readiness callbacks.

pub mod emitter;
pub mod error;
pub mod event_loop;
pub mod forward;
pub mod io;
pub mod pipe;
pub mod stream;

pub use emitter::{Emitter, Event, EventEmitter, EventKind, ListenerId, WeakEmitter};
pub use error::StreamError;
pub use event_loop::{EventLoop, Handle, ReadyLoop, WriteCallback};
pub use forward::forward_events;
pub use io::{Buffer, BufferOptions, IoResource, MemSink, WriteResource};
pub use pipe::{pipe, PipeOptions};
pub use stream::{
    CompositeStream, ReadableStream, ReadableStreamBase, ReadableStreamExt, ThroughStream,
    WritableStream, WritableStreamBase,
};
