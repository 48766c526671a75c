//! Audio encoder trait and common types

use bytes::Bytes;

use super::frame::AudioFrame;
use crate::config::AudioProfile;
use crate::error::{LiveError, MediaKind, Result};

/// Audio encoder configuration
#[derive(Debug, Clone, Default)]
pub struct AudioEncoderConfig {
    /// Encoder profile (sample rate, channels, bitrate)
    pub profile: AudioProfile,
}

/// Encoded audio sample unit
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    /// Encoded data
    pub data: Bytes,
    /// Sample unit duration in milliseconds
    pub duration_ms: u64,
    /// Sequence number
    pub sequence: u64,
    /// Presentation timestamp in milliseconds
    pub timestamp_ms: u64,
}

impl EncodedAudio {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Generic audio encoder trait
pub trait AudioEncoder: Send {
    /// Get encoder name
    fn name(&self) -> &str;

    /// Encode a PCM frame
    fn encode(&mut self, frame: &AudioFrame) -> Result<EncodedAudio>;

    /// Reset encoder state
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get current configuration
    fn config(&self) -> &AudioEncoderConfig;
}

/// Passthrough PCM encoder
///
/// Emits the raw PCM payload as the sample unit. Stands in for a real codec
/// when the ingest accepts PCM and serves as the reference encoder in tests
/// (a muted frame's silence is visible in the output verbatim).
pub struct PcmAudioEncoder {
    config: AudioEncoderConfig,
    sequence: u64,
}

impl PcmAudioEncoder {
    pub fn new(config: AudioEncoderConfig) -> Self {
        Self {
            config,
            sequence: 0,
        }
    }
}

impl Default for PcmAudioEncoder {
    fn default() -> Self {
        Self::new(AudioEncoderConfig::default())
    }
}

impl AudioEncoder for PcmAudioEncoder {
    fn name(&self) -> &str {
        "pcm"
    }

    fn encode(&mut self, frame: &AudioFrame) -> Result<EncodedAudio> {
        if frame.is_empty() {
            return Err(LiveError::Encoder {
                media: MediaKind::Audio,
                reason: "empty audio payload".to_string(),
            });
        }
        if frame.sample_rate != self.config.profile.sample_rate
            || frame.channels != self.config.profile.channels
        {
            return Err(LiveError::Encoder {
                media: MediaKind::Audio,
                reason: format!(
                    "format mismatch: got {}Hz {}ch, expected {}Hz {}ch",
                    frame.sample_rate,
                    frame.channels,
                    self.config.profile.sample_rate,
                    self.config.profile.channels
                ),
            });
        }

        let encoded = EncodedAudio {
            data: Bytes::copy_from_slice(frame.data()),
            duration_ms: frame.duration_ms(),
            sequence: self.sequence,
            timestamp_ms: frame.timestamp_ms,
        };
        self.sequence += 1;
        Ok(encoded)
    }

    fn reset(&mut self) -> Result<()> {
        self.sequence = 0;
        Ok(())
    }

    fn config(&self) -> &AudioEncoderConfig {
        &self.config
    }
}
