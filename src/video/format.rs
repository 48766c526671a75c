//! Pixel format and resolution definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw pixel formats accepted from a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// NV12 semi-planar format (Y plane + interleaved UV)
    Nv12,
    /// YUV420 planar format
    Yuv420,
    /// YUYV 4:2:2 packed format
    Yuyv,
    /// BGRA 32-bit format (common for platform pixel buffers)
    Bgra,
    /// RGB24 format (3 bytes per pixel)
    Rgb24,
    /// Pre-encoded bitstream (capture source already compressed)
    Encoded,
}

impl PixelFormat {
    /// Check if the format is already compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, PixelFormat::Encoded)
    }

    /// Expected frame size for a given resolution
    /// Returns None for compressed formats (variable size)
    pub fn frame_size(&self, resolution: Resolution) -> Option<usize> {
        let pixels = (resolution.width * resolution.height) as usize;
        match self {
            PixelFormat::Nv12 | PixelFormat::Yuv420 => Some(pixels * 3 / 2),
            PixelFormat::Yuyv => Some(pixels * 2),
            PixelFormat::Bgra => Some(pixels * 4),
            PixelFormat::Rgb24 => Some(pixels * 3),
            PixelFormat::Encoded => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Nv12 => write!(f, "NV12"),
            PixelFormat::Yuv420 => write!(f, "YUV420"),
            PixelFormat::Yuyv => write!(f, "YUYV"),
            PixelFormat::Bgra => write!(f, "BGRA"),
            PixelFormat::Rgb24 => write!(f, "RGB24"),
            PixelFormat::Encoded => write!(f, "ENCODED"),
        }
    }
}

/// Frame resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const SD480: Resolution = Resolution {
        width: 854,
        height: 480,
    };
    pub const HD720: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
    pub const HD1080: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
