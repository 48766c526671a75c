//! Video frame data structures

use bytes::Bytes;

use super::format::{PixelFormat, Resolution};

/// A raw video frame with capture metadata
///
/// Timestamps are milliseconds on the caller's monotonic timeline (e.g.
/// elapsed time since capture start). The session requires strictly
/// increasing timestamps per stream; stale frames are dropped and counted.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame payload
    data: Bytes,
    /// Frame resolution
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Capture timestamp in milliseconds (monotonic)
    pub timestamp_ms: u64,
}

impl VideoFrame {
    /// Create a frame by copying the caller's buffer
    ///
    /// Use this when the underlying buffer may be reused by the platform as
    /// soon as the push call returns; the copy happens before control goes
    /// back to the caller.
    pub fn from_slice(
        data: &[u8],
        resolution: Resolution,
        format: PixelFormat,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
            resolution,
            format,
            timestamp_ms,
        }
    }

    /// Create a frame adopting an already-owned buffer without copying
    pub fn from_shared(
        data: Bytes,
        resolution: Resolution,
        format: PixelFormat,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            data,
            resolution,
            format,
            timestamp_ms,
        }
    }

    /// Get frame data as a byte slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Get data length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_copies() {
        let buf = vec![1u8, 2, 3, 4];
        let frame = VideoFrame::from_slice(&buf, Resolution::HD720, PixelFormat::Nv12, 0);
        drop(buf);
        assert_eq!(frame.data(), &[1, 2, 3, 4]);
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_from_shared_no_copy() {
        let bytes = Bytes::from_static(b"frame");
        let frame = VideoFrame::from_shared(bytes.clone(), Resolution::HD720, PixelFormat::Encoded, 33);
        assert_eq!(frame.data_bytes(), bytes);
        assert_eq!(frame.timestamp_ms, 33);
    }
}
