//! Integration tests for the buffered writable stream

use evstream::{
    Buffer, BufferOptions, Event, EventEmitter, EventKind, MemSink, ReadyLoop, StreamError,
    WritableStream,
};

use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup(sink: &MemSink) -> (Arc<ReadyLoop>, Arc<Buffer<MemSink>>) {
    let event_loop = Arc::new(ReadyLoop::new());
    let buffer = Buffer::new(sink.clone(), event_loop.clone());
    (event_loop, buffer)
}

fn record(buffer: &Buffer<MemSink>) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::Drain, EventKind::Error, EventKind::Close] {
        let events = Arc::clone(&events);
        buffer
            .emitter()
            .on(kind, move |event| events.lock().push(event.clone()));
    }
    events
}

fn kinds(events: &Mutex<Vec<Event>>) -> Vec<EventKind> {
    events.lock().iter().map(Event::kind).collect()
}

#[test]
fn test_round_trip_preserves_order() {
    let sink = MemSink::new();
    let (_event_loop, buffer) = setup(&sink);

    assert!(buffer.write(Bytes::from("A")));
    assert!(buffer.write(Bytes::from("B")));
    buffer.handle_write();

    let guard = sink.lock();
    assert_eq!(&*guard, b"AB");
}

#[test]
fn test_partial_writes_keep_fifo_order() {
    let sink = MemSink::with_write_limit(2);
    let (event_loop, buffer) = setup(&sink);

    assert!(!buffer.write(Bytes::from("abc")));
    assert!(!buffer.write(Bytes::from("de")));
    assert!(!buffer.write(Bytes::from("fghij")));
    assert_eq!(buffer.queued_len(), 8);

    event_loop.run_until_idle(100);

    assert_eq!(sink.contents(), b"abcdefghij");
    assert_eq!(buffer.queued_len(), 0);
    assert!(!buffer.is_buffering());
}

#[test]
fn test_drain_after_refused_write_once_empty() {
    let sink = MemSink::new();
    sink.block_next(2);
    let (event_loop, buffer) = setup(&sink);
    let events = record(&buffer);

    assert!(!buffer.write(Bytes::from("data")));
    event_loop.tick();
    assert!(kinds(&events).is_empty());

    event_loop.tick();
    assert_eq!(kinds(&events), vec![EventKind::Drain]);
    assert_eq!(sink.contents(), b"data");
    assert_eq!(event_loop.pending(), 0);
}

#[test]
fn test_end_with_empty_queue_closes_immediately() {
    let sink = MemSink::new();
    let (_event_loop, buffer) = setup(&sink);
    let events = record(&buffer);

    buffer.end(Some(Bytes::from("bye")));

    assert_eq!(sink.contents(), b"bye");
    assert!(sink.is_closed());
    assert!(buffer.is_closed());
    assert_eq!(kinds(&events), vec![EventKind::Close]);
}

#[test]
fn test_end_waits_for_queue_to_drain() {
    let sink = MemSink::with_write_limit(1);
    let (event_loop, buffer) = setup(&sink);
    let events = record(&buffer);

    buffer.write(Bytes::from("xyz"));
    buffer.end(None);
    assert!(!buffer.is_writable());
    assert!(!buffer.is_closed());
    assert!(!sink.is_closed());

    event_loop.run_until_idle(100);

    assert_eq!(sink.contents(), b"xyz");
    assert!(sink.is_closed());
    assert_eq!(kinds(&events), vec![EventKind::Drain, EventKind::Close]);
}

#[test]
fn test_write_after_end_reports_error() {
    let sink = MemSink::new();
    sink.block_next(1);
    let (_event_loop, buffer) = setup(&sink);
    let events = record(&buffer);

    buffer.write(Bytes::from("a"));
    buffer.end(None);
    assert!(!buffer.write(Bytes::from("b")));

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::Error(StreamError::NotWritable)));
}

#[test]
fn test_write_after_close_is_silent_noop() {
    let sink = MemSink::new();
    let (_event_loop, buffer) = setup(&sink);
    buffer.close();
    let events = record(&buffer);

    assert!(!buffer.write(Bytes::from("late")));
    assert!(sink.is_empty());
    assert!(kinds(&events).is_empty());
}

#[test]
fn test_close_discards_queue_and_emits_once() {
    let sink = MemSink::with_write_limit(1);
    let (event_loop, buffer) = setup(&sink);
    let events = record(&buffer);

    buffer.write(Bytes::from("abc"));
    assert_eq!(event_loop.pending(), 1);

    buffer.close();
    buffer.close();
    buffer.handle_write();

    assert_eq!(sink.contents(), b"a");
    assert!(sink.is_closed());
    assert_eq!(event_loop.pending(), 0);
    assert_eq!(buffer.queued_len(), 0);
    assert_eq!(kinds(&events), vec![EventKind::Close]);
}

#[test]
fn test_transient_failure_is_retried() {
    init_tracing();
    let sink = MemSink::new();
    sink.fail_next(2, io::ErrorKind::Other);
    let (event_loop, buffer) = setup(&sink);
    let events = record(&buffer);

    assert!(!buffer.write(Bytes::from("ok")));
    event_loop.run_until_idle(10);

    assert_eq!(sink.contents(), b"ok");
    assert_eq!(kinds(&events), vec![EventKind::Drain]);
}

#[test]
fn test_persistent_failure_emits_error_then_close() {
    init_tracing();
    let sink = MemSink::new();
    sink.fail_next(10, io::ErrorKind::BrokenPipe);
    let event_loop = Arc::new(ReadyLoop::new());
    let options = BufferOptions {
        max_write_failures: 2,
        ..BufferOptions::default()
    };
    let buffer = Buffer::with_options(sink.clone(), event_loop.clone(), options);
    let events = record(&buffer);

    buffer.write(Bytes::from("doomed"));
    event_loop.run_until_idle(10);

    assert_eq!(sink.write_calls(), 2);
    assert!(buffer.is_closed());
    assert_eq!(event_loop.pending(), 0);
    let events = events.lock();
    assert_eq!(events.len(), 2);
    match &events[0] {
        Event::Error(err) => assert_eq!(err.io_kind(), Some(io::ErrorKind::BrokenPipe)),
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(events[1].kind(), EventKind::Close);
}

#[test]
fn test_close_failure_is_reported_before_close() {
    let sink = MemSink::new();
    sink.fail_close(io::ErrorKind::Other);
    let (_event_loop, buffer) = setup(&sink);
    let events = record(&buffer);

    buffer.close();

    let events = events.lock();
    assert!(matches!(&events[0], Event::Error(StreamError::Close(_))));
    assert_eq!(events[1].kind(), EventKind::Close);
}

#[test]
fn test_empty_write_is_accepted_without_touching_resource() {
    let sink = MemSink::new();
    let (_event_loop, buffer) = setup(&sink);

    assert!(buffer.write(Bytes::new()));
    assert_eq!(sink.write_calls(), 0);
}
