//! End-to-end session tests over a scripted decoder.

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::*;
use core_playback::{
    ChannelSink, Command, FrameSink, PlaybackError, Request, Response, SessionEnd, SessionState,
};
use core_runtime::events::{EventBus, SessionEvent};
use mockall::mock;
use std::time::Duration;

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Normal playback
// ============================================================================

#[tokio::test]
async fn test_frames_are_emitted_in_order_then_finish() {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();

    let (sink, mut rx) = ChannelSink::channel(16);
    let (reader, _) = pcm_source(5, false).await;
    let session = core_playback::SessionBuilder::new(options())
        .codec(core_playback::PcmCodec)
        .events(bus)
        .id("in-order")
        .start_with_stream(
            core_playback::PcmStream::new(reader, FakeDecoder::exits_with(0)),
            sink,
        )
        .unwrap();
    let handle = session.handle();

    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    assert_eq!(report.stats.frames_cached, 5);
    assert_eq!(report.stats.frames_emitted, 5);
    assert_eq!(report.stats.cached_bytes, 5 * frame_bytes());
    assert!((report.position_secs - 0.1).abs() < 1e-6);

    for i in 0..5u8 {
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.len(), frame_bytes());
        assert_eq!(frame_index(&frame), i);
    }
    assert!(rx.recv().await.is_none());

    assert_eq!(handle.state(), SessionState::Finished);
    assert!(handle.is_closed());

    let events = drain_events(&mut events);
    assert!(matches!(
        events.first(),
        Some(SessionEvent::Started { session_id, .. }) if session_id == "in-order"
    ));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::EncoderFinished { duration_secs, .. } if (duration_secs - 0.1).abs() < 1e-9
    )));
    assert!(matches!(events.last(), Some(SessionEvent::Finished { .. })));
}

#[tokio::test]
async fn test_playback_time_counts_emitted_frames() {
    let (sink, mut rx) = GatedSink::new(3);
    let decoder = FakeDecoder::until_interrupted();
    let (session, _writer) = start_session(options(), 5, true, decoder.clone(), sink).await;
    let handle = session.handle();

    for i in 0..3u8 {
        assert_eq!(frame_index(&rx.recv().await.unwrap()), i);
    }

    let secs = handle.playback_time().await.unwrap();
    assert!((secs - 3.0 / FPS).abs() < 1e-6);
    assert_eq!(handle.duration().await.unwrap(), None);

    handle.stop().await.unwrap();
    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Stopped);
    assert_eq!(report.stats.frames_emitted, 3);
    assert!(decoder.was_interrupted());
}

#[tokio::test]
async fn test_duration_is_known_once_input_ends() {
    let (sink, mut rx) = ChannelSink::channel(16);
    let (session, writer) =
        start_session(options(), 3, true, FakeDecoder::exits_with(0), sink).await;
    let handle = session.handle();

    handle.pause().await.unwrap();
    assert_eq!(handle.duration().await.unwrap(), None);
    assert_eq!(handle.state(), SessionState::Paused);

    // Closing the writer ends the input.
    drop(writer);
    let duration = eventually(|| {
        let handle = handle.clone();
        async move { handle.duration().await.unwrap() }
    })
    .await;
    assert!((duration - 0.06).abs() < 1e-6);
    assert!(rx.try_recv().is_err());

    handle.resume().await.unwrap();
    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    assert_eq!(report.stats.frames_emitted, 3);
}

#[tokio::test]
async fn test_seek_moves_the_cursor() {
    let (sink, mut rx) = ChannelSink::channel(16);
    let (session, _) = start_session(options(), 5, false, FakeDecoder::exits_with(0), sink).await;
    let handle = session.handle();

    handle.pause().await.unwrap();
    let duration = eventually(|| {
        let handle = handle.clone();
        async move { handle.duration().await.unwrap() }
    })
    .await;
    assert!((duration - 0.1).abs() < 1e-6);

    // 0.06s is exactly three frames in.
    handle.seek(0.06).await.unwrap();
    let secs = handle.playback_time().await.unwrap();
    assert!((secs - 0.06).abs() < 1e-6);
    handle.resume().await.unwrap();

    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);

    let mut seen = Vec::new();
    while let Some(frame) = rx.recv().await {
        seen.push(frame_index(&frame));
    }
    assert_eq!(seen, vec![3, 4]);
}

#[tokio::test]
async fn test_seek_past_the_end_finishes() {
    let (sink, mut rx) = ChannelSink::channel(16);
    let (session, _) = start_session(options(), 2, false, FakeDecoder::exits_with(0), sink).await;
    let handle = session.handle();

    handle.pause().await.unwrap();
    handle.seek(60.0).await.unwrap();
    handle.resume().await.unwrap();

    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    assert_eq!(report.stats.frames_emitted, 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_loop_replays_cache_until_stopped() {
    let (sink, mut rx) = ChannelSink::channel(4);
    let (session, _) = start_session(options(), 2, false, FakeDecoder::exits_with(0), sink).await;
    let handle = session.handle();

    handle.start_loop().await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..6 {
        seen.push(frame_index(&rx.recv().await.unwrap()));
    }
    assert_eq!(seen, vec![0, 1, 0, 1, 0, 1]);
    assert_eq!(handle.state(), SessionState::Streaming);

    let drainer = tokio::spawn(async move {
        let mut count = 0usize;
        while rx.recv().await.is_some() {
            count += 1;
        }
        count
    });

    handle.stop().await.unwrap();
    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Stopped);
    assert!(report.stats.loops_completed >= 2);
    assert_eq!(report.stats.frames_cached, 2);

    drainer.await.unwrap();
}

#[tokio::test]
async fn test_stop_loop_lets_playback_finish() {
    let (sink, mut rx) = ChannelSink::channel(4);
    let (session, _) = start_session(options(), 2, false, FakeDecoder::exits_with(0), sink).await;
    let handle = session.handle();

    handle.start_loop().await.unwrap();
    for _ in 0..3 {
        rx.recv().await.unwrap();
    }
    handle.stop_loop().await.unwrap();

    let drainer = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    drainer.await.unwrap();
}

#[tokio::test]
async fn test_empty_input_finishes_even_when_looping() {
    let (sink, mut rx) = ChannelSink::channel(4);
    let (session, _) = start_session(options(), 0, false, FakeDecoder::exits_with(0), sink).await;
    session.handle().start_loop().await.unwrap();

    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    assert_eq!(report.stats.frames_cached, 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_pause_and_resume_are_idempotent() {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();

    let (sink, mut rx) = ChannelSink::channel(16);
    let (reader, _) = pcm_source(3, false).await;
    let session = core_playback::SessionBuilder::new(options())
        .codec(core_playback::PcmCodec)
        .events(bus)
        .start_with_stream(
            core_playback::PcmStream::new(reader, FakeDecoder::exits_with(0)),
            sink,
        )
        .unwrap();
    let handle = session.handle();

    handle.pause().await.unwrap();
    handle.pause().await.unwrap();
    assert_eq!(handle.playback_time().await.unwrap(), 0.0);
    assert_eq!(handle.state(), SessionState::Paused);
    assert!(rx.try_recv().is_err());

    handle.resume().await.unwrap();
    handle.resume().await.unwrap();

    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    assert_eq!(report.stats.frames_emitted, 3);

    let events = drain_events(&mut events);
    let paused = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Paused { .. }))
        .count();
    let resumed = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Resumed { .. }))
        .count();
    assert_eq!((paused, resumed), (1, 1));
}

#[tokio::test]
async fn test_resume_without_pause_is_a_no_op() {
    let (sink, _rx) = ChannelSink::channel(16);
    let (session, _) = start_session(options(), 1, false, FakeDecoder::exits_with(0), sink).await;

    session.handle().resume().await.unwrap();
    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    assert_eq!(report.stats.frames_emitted, 1);
}

// ============================================================================
// Stop and failures
// ============================================================================

#[tokio::test]
async fn test_stop_interrupts_running_decoder() {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();

    let (sink, mut rx) = ChannelSink::channel(16);
    let decoder = FakeDecoder::until_interrupted();
    let (reader, _writer) = pcm_source(2, true).await;
    let session = core_playback::SessionBuilder::new(options())
        .codec(core_playback::PcmCodec)
        .events(bus)
        .start_with_stream(core_playback::PcmStream::new(reader, decoder.clone()), sink)
        .unwrap();
    let handle = session.handle();

    rx.recv().await.unwrap();
    rx.recv().await.unwrap();

    handle.stop().await.unwrap();
    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Stopped);
    assert_eq!(report.stats.frames_emitted, 2);
    assert!(decoder.was_interrupted());
    assert!(rx.recv().await.is_none());
    assert_eq!(handle.state(), SessionState::Stopped);

    let events = drain_events(&mut events);
    assert!(matches!(events.last(), Some(SessionEvent::Stopped { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::EncoderFinished { .. })));
}

#[tokio::test]
async fn test_cache_budget_is_enforced() {
    let budget = 2 * frame_bytes() + 10;
    let options = core_playback::SessionOptions {
        max_cache_bytes: budget,
        ..options()
    };
    let decoder = FakeDecoder::until_interrupted();
    let (sink, mut rx) = ChannelSink::channel(16);
    let (session, _writer) = start_session(options, 5, true, decoder.clone(), sink).await;
    let handle = session.handle();

    let err = session.wait().await.unwrap_err();
    assert!(matches!(err, PlaybackError::CacheOverflow { budget: b } if b == budget));
    assert!(err.to_string().contains(&budget.to_string()));
    assert!(decoder.was_interrupted());
    assert_eq!(handle.state(), SessionState::Failed);

    let mut emitted = 0;
    while rx.recv().await.is_some() {
        emitted += 1;
    }
    assert!(emitted <= 2);
}

#[tokio::test]
async fn test_unexpected_decoder_exit_fails_session() {
    let (sink, _rx) = ChannelSink::channel(16);
    let (session, _) = start_session(options(), 1, false, FakeDecoder::exits_with(1), sink).await;

    let err = session.wait().await.unwrap_err();
    assert!(matches!(err, PlaybackError::SubprocessExit { code: Some(1) }));
}

#[tokio::test]
async fn test_dropped_receiver_fails_session() {
    let (sink, rx) = ChannelSink::channel(16);
    drop(rx);
    let decoder = FakeDecoder::until_interrupted();
    let (session, _writer) = start_session(options(), 1, true, decoder.clone(), sink).await;

    let err = session.wait().await.unwrap_err();
    assert!(matches!(err, PlaybackError::SinkClosed));
    assert!(decoder.was_interrupted());
}

mock! {
    pub Sink {}

    #[async_trait]
    impl FrameSink for Sink {
        fn try_send(&mut self, frame: &Bytes) -> core_playback::Result<bool>;
        async fn send(&mut self, frame: Bytes) -> core_playback::Result<()>;
    }
}

#[tokio::test]
async fn test_sink_error_stops_encoder() {
    let mut sink = MockSink::new();
    sink.expect_try_send()
        .times(1)
        .returning(|_| Err(PlaybackError::SinkClosed));
    sink.expect_send().never();

    let decoder = FakeDecoder::until_interrupted();
    let (session, _writer) = start_session(options(), 1, true, decoder.clone(), sink).await;

    let err = session.wait().await.unwrap_err();
    assert!(matches!(err, PlaybackError::SinkClosed));
    assert!(decoder.was_interrupted());
}

#[tokio::test]
async fn test_full_sink_is_retried_while_encoding() {
    let mut sink = MockSink::new();
    let mut offers = 0;
    sink.expect_try_send().returning(move |_| {
        offers += 1;
        Ok(offers > 3)
    });
    sink.expect_send().returning(|_| Ok(()));

    let (session, _) = start_session(options(), 1, false, FakeDecoder::exits_with(0), sink).await;
    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    assert_eq!(report.stats.frames_emitted, 1);
}

// ============================================================================
// Queries at the session boundary
// ============================================================================

#[tokio::test]
async fn test_query_queued_before_stop_is_answered() {
    let decoder = FakeDecoder::until_interrupted();
    let (sink, _rx) = ChannelSink::channel(16);
    let (session, _writer) = start_session(options(), 2, true, decoder, sink).await;
    let handle = session.handle();

    handle.stop().await.unwrap();
    let (request, reply) = Request::query(Command::GetPlaybackTime);
    handle.submit(request).await.unwrap();

    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Stopped);
    assert_eq!(reply.await.unwrap(), Response::PlaybackTime(0.0));
}

#[tokio::test]
async fn test_duration_query_after_stop_stays_unknown() {
    let decoder = FakeDecoder::until_interrupted();
    let (sink, mut rx) = ChannelSink::channel(16);
    let (session, _writer) = start_session(options(), 2, true, decoder, sink).await;
    let handle = session.handle();

    rx.recv().await.unwrap();
    rx.recv().await.unwrap();
    assert_eq!(handle.duration().await.unwrap(), None);

    handle.stop().await.unwrap();
    let (request, reply) = Request::query(Command::GetDuration);
    handle.submit(request).await.unwrap();

    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Stopped);
    assert_eq!(report.stats.frames_cached, 2);
    assert_eq!(reply.await.unwrap(), Response::DurationUnknown);
}

#[tokio::test]
async fn test_query_after_end_reports_session_ended() {
    let (sink, _rx) = ChannelSink::channel(16);
    let (session, _) = start_session(options(), 1, false, FakeDecoder::exits_with(0), sink).await;
    let handle = session.handle();

    session.wait().await.unwrap();

    assert!(handle.playback_time().await.unwrap_err().is_session_ended());
    assert!(handle.duration().await.unwrap_err().is_session_ended());
    assert!(handle.pause().await.unwrap_err().is_session_ended());
    assert_eq!(handle.ended().await, SessionState::Finished);
}

#[tokio::test]
async fn test_query_times_out_while_sink_is_blocked() {
    let options = core_playback::SessionOptions {
        query_timeout: Some(Duration::from_millis(50)),
        ..options()
    };
    let (sink, mut rx) = GatedSink::new(0);
    let gate = sink.clone();
    let (session, _) = start_session(options, 1, false, FakeDecoder::exits_with(0), sink).await;
    let handle = session.handle();

    // Once the input is fully cached the dispatcher waits on the sink.
    eventually(|| {
        let state = handle.state();
        async move { (state == SessionState::Draining).then_some(()) }
    })
    .await;

    let err = handle.playback_time().await.unwrap_err();
    assert!(matches!(
        err,
        PlaybackError::QueryTimeout {
            command: "GetPlaybackTime",
            timeout_ms: 50
        }
    ));
    assert!(!handle.is_closed());

    gate.allow(1);
    let report = session.wait().await.unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    assert_eq!(frame_index(&rx.recv().await.unwrap()), 0);
}

#[tokio::test]
async fn test_playback_continues_without_controller() {
    let (sink, mut rx) = ChannelSink::channel(16);
    let (session, _) = start_session(options(), 3, false, FakeDecoder::exits_with(0), sink).await;
    let (handle, task) = session.into_parts();
    drop(handle);

    let report = task.await.unwrap().unwrap();
    assert_eq!(report.end, SessionEnd::Finished);
    for i in 0..3u8 {
        assert_eq!(frame_index(&rx.recv().await.unwrap()), i);
    }
}

#[tokio::test]
async fn test_request_dispatches_commands_and_queries() {
    let (sink, _rx) = ChannelSink::channel(16);
    let (session, _writer) =
        start_session(options(), 1, true, FakeDecoder::until_interrupted(), sink).await;
    let handle = session.handle();

    assert_eq!(handle.request(Command::Pause).await.unwrap(), None);
    assert_eq!(
        handle.request(Command::GetDuration).await.unwrap(),
        Some(Response::DurationUnknown)
    );
    assert_eq!(handle.request(Command::Stop).await.unwrap(), None);
    assert_eq!(session.wait().await.unwrap().end, SessionEnd::Stopped);
}
