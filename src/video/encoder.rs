//! Video encoder trait and common types
//!
//! Encoders are pluggable black boxes: raw frame in, compressed sample unit
//! out. The session drives exactly one encoder per media type on its worker
//! and applies the configured fault policy when `encode` fails.

use bytes::Bytes;

use super::format::PixelFormat;
use super::frame::VideoFrame;
use crate::config::VideoProfile;
use crate::error::{LiveError, MediaKind, Result};

/// Video encoder configuration
#[derive(Debug, Clone)]
pub struct VideoEncoderConfig {
    /// Encoder profile (resolution, bitrate, fps, gop)
    pub profile: VideoProfile,
    /// Input pixel format
    pub input_format: PixelFormat,
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self {
            profile: VideoProfile::default(),
            input_format: PixelFormat::Nv12,
        }
    }
}

/// Encoded video sample unit
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded data
    pub data: Bytes,
    /// Output format
    pub format: EncodedFormat,
    /// Whether this is a key frame
    pub key_frame: bool,
    /// Frame sequence number
    pub sequence: u64,
    /// Presentation timestamp in milliseconds
    pub timestamp_ms: u64,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Encoded output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedFormat {
    H264,
    H265,
    Raw,
}

impl std::fmt::Display for EncodedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodedFormat::H264 => write!(f, "H.264"),
            EncodedFormat::H265 => write!(f, "H.265"),
            EncodedFormat::Raw => write!(f, "RAW"),
        }
    }
}

/// Generic video encoder trait
/// Note: Not Sync because some encoder backends are not thread-safe
pub trait VideoEncoder: Send {
    /// Get encoder name
    fn name(&self) -> &str;

    /// Get output format
    fn output_format(&self) -> EncodedFormat;

    /// Encode a raw frame
    fn encode(&mut self, frame: &VideoFrame) -> Result<EncodedFrame>;

    /// Make the next encoded frame a key frame
    fn force_keyframe(&mut self);

    /// Reset encoder state (drops reference frames; next output is a key frame)
    fn reset(&mut self) -> Result<()> {
        self.force_keyframe();
        Ok(())
    }

    /// Get current configuration
    fn config(&self) -> &VideoEncoderConfig;

    /// Check if encoder supports the given input format
    fn supports_format(&self, format: PixelFormat) -> bool;
}

/// Passthrough encoder for pre-encoded capture input
///
/// Wraps already-compressed frame payloads into sample units, stamping key
/// frames on the configured gop cadence. Also serves as the reference
/// encoder in tests.
pub struct PassthroughVideoEncoder {
    config: VideoEncoderConfig,
    sequence: u64,
    frames_since_keyframe: u32,
    keyframe_requested: bool,
}

impl PassthroughVideoEncoder {
    pub fn new(config: VideoEncoderConfig) -> Self {
        Self {
            config,
            sequence: 0,
            frames_since_keyframe: 0,
            keyframe_requested: false,
        }
    }
}

impl Default for PassthroughVideoEncoder {
    fn default() -> Self {
        Self::new(VideoEncoderConfig {
            input_format: PixelFormat::Encoded,
            ..Default::default()
        })
    }
}

impl VideoEncoder for PassthroughVideoEncoder {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn output_format(&self) -> EncodedFormat {
        EncodedFormat::Raw
    }

    fn encode(&mut self, frame: &VideoFrame) -> Result<EncodedFrame> {
        if frame.is_empty() {
            return Err(LiveError::Encoder {
                media: MediaKind::Video,
                reason: "empty frame payload".to_string(),
            });
        }
        if !self.supports_format(frame.format) {
            return Err(LiveError::Encoder {
                media: MediaKind::Video,
                reason: format!("unsupported input format {}", frame.format),
            });
        }

        let gop = self.config.profile.gop_size.max(1);
        let key_frame = self.keyframe_requested || self.frames_since_keyframe % gop == 0;

        let encoded = EncodedFrame {
            data: frame.data_bytes(),
            format: self.output_format(),
            key_frame,
            sequence: self.sequence,
            timestamp_ms: frame.timestamp_ms,
        };

        self.sequence += 1;
        self.frames_since_keyframe = if key_frame {
            1
        } else {
            self.frames_since_keyframe + 1
        };
        self.keyframe_requested = false;

        Ok(encoded)
    }

    fn force_keyframe(&mut self) {
        self.keyframe_requested = true;
    }

    fn config(&self) -> &VideoEncoderConfig {
        &self.config
    }

    fn supports_format(&self, format: PixelFormat) -> bool {
        format == self.config.input_format
    }
}
