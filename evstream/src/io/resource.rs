//! Raw output resources a [`Buffer`](super::Buffer) flushes into

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

/// Non-blocking byte sink.
///
/// `write` accepts as many bytes as the resource can take right now. Taking
/// fewer than offered (including zero), or failing with
/// [`io::ErrorKind::WouldBlock`], means "try again when writable".
pub trait WriteResource: Send + 'static {
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Release the resource. Called once; the resource is dropped afterwards.
    fn close(&mut self) -> io::Result<()>;
}

/// Any [`std::io::Write`] as a resource; closing flushes it
#[derive(Debug)]
pub struct IoResource<W>(pub W);

impl<W: Write + Send + 'static> WriteResource for IoResource<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.write(data)
    }

    fn close(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scripted {
    WouldBlock,
    Fail(io::ErrorKind),
}

#[derive(Debug, Default)]
struct MemState {
    data: Vec<u8>,
    write_limit: Option<usize>,
    script: VecDeque<Scripted>,
    close_error: Option<io::ErrorKind>,
    write_calls: usize,
    closed: bool,
}

/// Read-only guard to the sink contents
///
/// Holds the lock; the lock is released when the guard is dropped.
pub struct MemSinkReadGuard<'a>(MutexGuard<'a, MemState>);

impl Deref for MemSinkReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0.data
    }
}

impl AsRef<[u8]> for MemSinkReadGuard<'_> {
    fn as_ref(&self) -> &[u8] {
        &self.0.data
    }
}

/// Shared in-memory resource
///
/// Clones share the same data, so a test keeps one clone for inspection and
/// hands the other to a `Buffer`. The sink can be throttled
/// ([`MemSink::set_write_limit`]) and scripted to refuse or fail upcoming
/// writes.
///
/// # Example
///
/// ```
/// use evstream::io::{MemSink, WriteResource};
///
/// let sink = MemSink::with_write_limit(3);
/// let mut resource = sink.clone();
/// assert_eq!(resource.write(b"hello").unwrap(), 3);
///
/// let guard = sink.lock();
/// assert_eq!(&*guard, b"hel");
/// ```
#[derive(Clone, Default)]
pub struct MemSink(Arc<Mutex<MemState>>);

impl MemSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that accepts at most `limit` bytes per write call
    #[must_use]
    pub fn with_write_limit(limit: usize) -> Self {
        let sink = Self::new();
        sink.set_write_limit(Some(limit));
        sink
    }

    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.0.lock().write_limit = limit;
    }

    /// Make the next `n` writes fail with `WouldBlock`
    pub fn block_next(&self, n: usize) {
        let mut state = self.0.lock();
        state.script.extend(std::iter::repeat(Scripted::WouldBlock).take(n));
    }

    /// Make the next `n` writes fail with an error of `kind`
    pub fn fail_next(&self, n: usize, kind: io::ErrorKind) {
        let mut state = self.0.lock();
        state.script.extend(std::iter::repeat(Scripted::Fail(kind)).take(n));
    }

    /// Make `close` fail with an error of `kind`
    pub fn fail_close(&self, kind: io::ErrorKind) {
        self.0.lock().close_error = Some(kind);
    }

    /// Lock the contents for reading
    #[must_use]
    pub fn lock(&self) -> MemSinkReadGuard<'_> {
        MemSinkReadGuard(self.0.lock())
    }

    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().data.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().data.is_empty()
    }

    /// Write attempts seen so far, refused ones included
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.0.lock().write_calls
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.lock().closed
    }
}

impl WriteResource for MemSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.0.lock();
        state.write_calls += 1;
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        match state.script.pop_front() {
            Some(Scripted::WouldBlock) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(Scripted::Fail(kind)) => return Err(io::Error::new(kind, "scripted failure")),
            None => {}
        }
        let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        #[allow(clippy::indexing_slicing)]
        state.data.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.0.lock();
        state.closed = true;
        match state.close_error.take() {
            Some(kind) => Err(io::Error::new(kind, "scripted close failure")),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for MemSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.lock();
        write!(
            f,
            "MemSink(len={}, limit={:?}, scripted={}, closed={})",
            state.data.len(),
            state.write_limit,
            state.script.len(),
            state.closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sink_is_empty() {
        let sink = MemSink::new();
        assert!(sink.is_empty());
        assert_eq!(sink.len(), 0);
    }

    #[test]
    fn test_clone_shares_data() {
        let sink1 = MemSink::new();
        let mut sink2 = sink1.clone();

        sink2.write(b"from sink2").unwrap();

        let guard = sink1.lock();
        assert_eq!(&*guard, b"from sink2");
    }

    #[test]
    fn test_scripted_outcomes_come_first() {
        let mut sink = MemSink::new();
        sink.block_next(1);
        sink.fail_next(1, io::ErrorKind::Other);

        assert_eq!(sink.write(b"a").unwrap_err().kind(), io::ErrorKind::WouldBlock);
        assert_eq!(sink.write(b"a").unwrap_err().kind(), io::ErrorKind::Other);
        assert_eq!(sink.write(b"a").unwrap(), 1);
        assert_eq!(sink.write_calls(), 3);
    }

    #[test]
    fn test_closed_sink_refuses_writes() {
        let mut sink = MemSink::new();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert_eq!(sink.write(b"x").unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_io_resource_wraps_write() {
        let mut resource = IoResource(Vec::new());
        assert_eq!(resource.write(b"abc").unwrap(), 3);
        resource.close().unwrap();
        assert_eq!(resource.0, b"abc");
    }
}
