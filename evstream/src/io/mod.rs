//! Buffered output over raw resources
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  pipe (flow control)                │
//! │  - pauses source on refused write   │
//! │  - resumes source on Drain          │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ writes chunks into
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  Buffer (WritableStream)            │
//! │  - FIFO queue of pending chunks     │
//! │  - flushes on writable-readiness    │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ owns exclusively
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  WriteResource                      │
//! │  - non-blocking write / close       │
//! └─────────────────────────────────────┘
//!      ▲              ▲
//!      │              │
//!   MemSink    IoResource<W: Write>
//! ```

pub mod buffer;
pub mod resource;

pub use buffer::{Buffer, BufferOptions};
pub use resource::{IoResource, MemSink, MemSinkReadGuard, WriteResource};
