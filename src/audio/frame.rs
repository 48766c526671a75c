//! Raw audio frame data structures

use bytes::Bytes;

/// A block of raw PCM audio (S16LE interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM payload, interleaved signed 16-bit little-endian
    data: Bytes,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u32,
    /// Capture timestamp in milliseconds (monotonic)
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Create a frame by copying the caller's buffer
    pub fn from_slice(data: &[u8], sample_rate: u32, channels: u32, timestamp_ms: u64) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            sample_rate,
            channels,
            timestamp_ms,
        }
    }

    /// Create a frame adopting an already-owned buffer without copying
    pub fn from_shared(data: Bytes, sample_rate: u32, channels: u32, timestamp_ms: u64) -> Self {
        Self {
            data,
            sample_rate,
            channels,
            timestamp_ms,
        }
    }

    /// Get the raw payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Zero-copy view of the payload as i16 samples
    pub fn samples(&self) -> &[i16] {
        bytemuck::cast_slice(&self.data)
    }

    /// Number of samples per channel in this frame
    pub fn samples_per_channel(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.data.len() / 2 / self.channels as usize
    }

    /// Frame duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples_per_channel() as u64 * 1000) / self.sample_rate as u64
    }

    /// A same-shaped frame whose payload is silence
    ///
    /// Used for mute: sample units keep being produced at the same cadence
    /// and duration so the mux timeline stays contiguous.
    pub fn silenced(&self) -> Self {
        Self {
            data: Bytes::from(vec![0u8; self.data.len()]),
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp_ms: self.timestamp_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
