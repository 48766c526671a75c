//! Video types and the encoder seam

pub mod encoder;
pub mod format;
pub mod frame;

pub use encoder::{
    EncodedFormat, EncodedFrame, PassthroughVideoEncoder, VideoEncoder, VideoEncoderConfig,
};
pub use format::{PixelFormat, Resolution};
pub use frame::VideoFrame;
