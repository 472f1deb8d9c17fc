//! Pipe demo
//!
//! Reads stdin line by line into a readable stream, pipes it through an
//! upper-casing `ThroughStream` into a `Buffer` over stdout, and drives the
//! buffer with a `ReadyLoop`.
//!
//! `EVSTREAM_SOFT_LIMIT` sets the buffer's soft limit in bytes.

use std::sync::Arc;

use bytes::Bytes;
use evstream::{
    Buffer, BufferOptions, IoResource, ReadableStream, ReadableStreamBase, ReadableStreamExt,
    ReadyLoop, ThroughStream,
};
use tokio::io::{AsyncBufReadExt, BufReader};

const MAX_TICKS: usize = 10_000;

fn buffer_options() -> BufferOptions {
    let mut options = BufferOptions::default();
    if let Ok(value) = std::env::var("EVSTREAM_SOFT_LIMIT") {
        match value.parse() {
            Ok(limit) => options.soft_limit = limit,
            Err(e) => log::warn!("ignoring EVSTREAM_SOFT_LIMIT={value:?}: {e}"),
        }
    }
    options
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let event_loop = Arc::new(ReadyLoop::new());
    let source = Arc::new(ReadableStreamBase::new());
    let upper = Arc::new(ThroughStream::with_filter(|chunk| {
        Bytes::from(chunk.to_ascii_uppercase())
    }));
    let sink = Buffer::with_options(
        IoResource(std::io::stdout()),
        event_loop.clone(),
        buffer_options(),
    );

    source.pipe(Arc::clone(&upper)).pipe(sink);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        source.push(format!("{line}\n"));
        if source.is_paused() {
            event_loop.run(MAX_TICKS).await;
        }
    }
    source.end();

    let ticks = event_loop.run(MAX_TICKS).await;
    log::info!("pipe_demo: done after {ticks} final ticks");
    Ok(())
}
