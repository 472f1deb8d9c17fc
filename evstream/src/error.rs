//! Error conditions reported through the `Error` event

use std::io;
use std::sync::Arc;

/// Failure reported by a stream.
///
/// Never returned from `write`/`end`/`close`: streams emit it as
/// [`Event::Error`](crate::Event::Error) and carry on (or close).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    /// The stream was written to after it stopped accepting data
    #[error("stream is not writable")]
    NotWritable,

    /// The underlying resource kept failing to accept data
    #[error("unable to write to resource: {0}")]
    Write(#[source] Arc<io::Error>),

    /// The underlying resource failed to release cleanly
    #[error("unable to close resource: {0}")]
    Close(#[source] Arc<io::Error>),
}

impl StreamError {
    #[must_use]
    pub fn write(err: io::Error) -> Self {
        Self::Write(Arc::new(err))
    }

    #[must_use]
    pub fn close(err: io::Error) -> Self {
        Self::Close(Arc::new(err))
    }

    /// Kind of the underlying I/O error, if any
    #[must_use]
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::NotWritable => None,
            Self::Write(e) | Self::Close(e) => Some(e.kind()),
        }
    }
}
