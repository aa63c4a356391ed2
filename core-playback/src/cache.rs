//! # Frame Cache
//!
//! Append-only store of every frame one session produced, kept so looping
//! and seeking never re-run the decoder. The cache lives exactly as long as
//! its session and is only touched by the dispatcher.

use bytes::Bytes;

/// Ordered, append-only sequence of encoded frames.
///
/// Insertion order is playback order. `total_bytes` always equals the sum
/// of the appended frame lengths. Capacity is enforced by the encoder
/// before a frame reaches the cache, so appending never fails.
#[derive(Debug, Default, Clone)]
pub struct FrameCache {
    frames: Vec<Bytes>,
    total_bytes: usize,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::with_capacity(512)
    }

    pub fn with_capacity(frames: usize) -> Self {
        Self {
            frames: Vec::with_capacity(frames),
            total_bytes: 0,
        }
    }

    /// Append a frame at the end and account for its size.
    pub fn append(&mut self, frame: Bytes) {
        self.total_bytes += frame.len();
        self.frames.push(frame);
    }

    /// Frame at `index`, or `None` if it has not been produced.
    pub fn at(&self, index: usize) -> Option<&Bytes> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sum of all cached frame sizes in bytes.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Iterate frames in playback order.
    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.frames.iter()
    }
}
