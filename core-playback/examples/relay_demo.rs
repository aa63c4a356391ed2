//! # Relay Demo
//!
//! Streams one input through a session into a DCA file, printing session
//! events as they happen.
//!
//! Run with:
//! `cargo run --example relay_demo --package core-playback -- <input> <out.dca> [config.json]`
//!
//! Once the first second has played the demo pauses, queries the position,
//! seeks back to the start and resumes.

use anyhow::{bail, Context};
use core_playback::{DcaWriter, SessionBuilder, SessionOptions};
use core_runtime::config::RelayConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, LogLevel, LoggingConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_level(LogLevel::Debug))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (input, output) = match args.as_slice() {
        [input, output, ..] => (input.clone(), output.clone()),
        _ => bail!("usage: relay_demo <input> <out.dca> [config.json]"),
    };

    let config = match args.get(2) {
        Some(path) => RelayConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path))?,
        None => RelayConfig::default(),
    };
    let options = SessionOptions::from_relay_config(&config);

    let bus = EventBus::default();
    let mut events = EventStream::new(bus.subscribe());
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("event: {}", event.description());
        }
    });

    let file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("creating {}", output))?;
    let (sink, writer) = DcaWriter::spawn(file, options.frame_queue_depth);

    let session = SessionBuilder::new(options).events(bus).start(&input, sink)?;
    let handle = session.handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if handle.pause().await.is_err() {
            return;
        }
        if let Ok(secs) = handle.playback_time().await {
            println!("paused at {}", core_playback::protocol::format_timestamp(secs));
        }
        if let Ok(Some(total)) = handle.duration().await {
            println!("fully cached: {:.2}s", total);
        }
        let _ = handle.seek(0.0).await;
        let _ = handle.resume().await;
    });

    let report = session.wait().await?;
    let frames = writer.await??;

    println!(
        "{:?} after {:.2}s: {} frames written, {} loops, {} bytes cached",
        report.end,
        report.position_secs,
        frames,
        report.stats.loops_completed,
        report.stats.cached_bytes
    );
    Ok(())
}
