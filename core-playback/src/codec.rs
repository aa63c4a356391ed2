//! # Frame Codecs
//!
//! Compress one window of interleaved PCM samples into one frame.
//!
//! | Codec | Feature | Output |
//! |-------|---------|--------|
//! | [`PcmCodec`] | always | the window as s16le bytes |
//! | `OpusCodec` | `opus` | one Opus packet |

use crate::config::SessionOptions;
use crate::error::Result;
use bytes::{BufMut, Bytes, BytesMut};

/// Turns a full PCM window into an encoded frame.
///
/// The encoder task calls this once per frame with exactly
/// `frame_size * channels` interleaved samples.
pub trait FrameCodec: Send {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes>;

    /// Short codec name for logs.
    fn name(&self) -> &'static str;
}

/// Passes samples through unchanged, serialized as little-endian i16.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmCodec;

impl FrameCodec for PcmCodec {
    fn encode(&mut self, pcm: &[i16]) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(pcm.len() * 2);
        for sample in pcm {
            out.put_i16_le(*sample);
        }
        Ok(out.freeze())
    }

    fn name(&self) -> &'static str {
        "pcm"
    }
}

#[cfg(feature = "opus")]
pub use self::opus::OpusCodec;

#[cfg(feature = "opus")]
mod opus {
    use super::FrameCodec;
    use crate::config::SessionOptions;
    use crate::error::{PlaybackError, Result};
    use audiopus::coder::Encoder;
    use audiopus::{Application, Bitrate, Channels, SampleRate};
    use bytes::Bytes;

    /// Opus encoder tuned for music (`Application::Audio`).
    pub struct OpusCodec {
        encoder: Encoder,
        buffer: Vec<u8>,
    }

    impl OpusCodec {
        pub fn new(options: &SessionOptions) -> Result<Self> {
            let sample_rate = SampleRate::try_from(options.pcm.sample_rate as i32)
                .map_err(|e| PlaybackError::InvalidOptions(format!("sample rate: {}", e)))?;
            let channels = Channels::try_from(options.pcm.channels as i32)
                .map_err(|e| PlaybackError::InvalidOptions(format!("channels: {}", e)))?;

            let mut encoder = Encoder::new(sample_rate, channels, Application::Audio)
                .map_err(|e| PlaybackError::Encode(e.to_string()))?;
            encoder
                .set_bitrate(Bitrate::BitsPerSecond(options.bitrate as i32))
                .map_err(|e| PlaybackError::InvalidOptions(format!("bitrate: {}", e)))?;

            Ok(Self {
                encoder,
                // A packet is never larger than the PCM it encodes.
                buffer: vec![0; options.frame_bytes()],
            })
        }
    }

    impl FrameCodec for OpusCodec {
        fn encode(&mut self, pcm: &[i16]) -> Result<Bytes> {
            let len = self
                .encoder
                .encode(pcm, &mut self.buffer)
                .map_err(|e| PlaybackError::Encode(e.to_string()))?;
            Ok(Bytes::copy_from_slice(&self.buffer[..len]))
        }

        fn name(&self) -> &'static str {
            "opus"
        }
    }
}

/// The codec sessions use unless one is supplied: Opus when the `opus`
/// feature is enabled, PCM passthrough otherwise.
pub fn default_codec(options: &SessionOptions) -> Result<Box<dyn FrameCodec>> {
    #[cfg(feature = "opus")]
    {
        Ok(Box::new(OpusCodec::new(options)?))
    }

    #[cfg(not(feature = "opus"))]
    {
        let _ = options;
        Ok(Box::new(PcmCodec))
    }
}
