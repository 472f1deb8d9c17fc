//! Readable and writable stream contracts
//!
//! Both contracts take `&self`: streams are shared as `Arc<T>` between their
//! owner and the listeners of every pipe they take part in, so state changes
//! go through interior mutability.

pub mod base;
pub mod composite;
pub mod through;

use std::sync::Arc;

use bytes::Bytes;

use crate::emitter::EventEmitter;
use crate::pipe::{pipe, PipeOptions};

pub use base::{ReadableStreamBase, WritableStreamBase};
pub use composite::CompositeStream;
pub use through::ThroughStream;

/// Source of `Data` events.
///
/// Emits `Data` for every chunk, `End` on graceful completion and `Close`
/// once the stream is done for good.
pub trait ReadableStream: EventEmitter + Send + Sync {
    fn is_readable(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Stop emitting `Data` until [`ReadableStream::resume`]
    fn pause(&self);

    fn resume(&self);

    fn close(&self);
}

/// Sink for chunks.
///
/// `write` never blocks. A `false` return asks the caller to hold off until
/// the stream emits `Drain`; the chunk itself is not lost.
pub trait WritableStream: EventEmitter + Send + Sync {
    fn is_writable(&self) -> bool;

    fn write(&self, chunk: Bytes) -> bool;

    /// Write an optional last chunk and stop accepting data
    fn end(&self, chunk: Option<Bytes>);

    fn close(&self);
}

/// `source.pipe(dest)` spelling of [`pipe`]
pub trait ReadableStreamExt: ReadableStream + Sized + 'static {
    fn pipe<D>(self: &Arc<Self>, dest: Arc<D>) -> Arc<D>
    where
        D: WritableStream + ?Sized + 'static,
    {
        pipe(self, dest, PipeOptions::default())
    }

    fn pipe_with<D>(self: &Arc<Self>, dest: Arc<D>, options: PipeOptions) -> Arc<D>
    where
        D: WritableStream + ?Sized + 'static,
    {
        pipe(self, dest, options)
    }
}

impl<T: ReadableStream + Sized + 'static> ReadableStreamExt for T {}
