//! Audio types and the encoder seam

pub mod encoder;
pub mod frame;

pub use encoder::{AudioEncoder, AudioEncoderConfig, EncodedAudio, PcmAudioEncoder};
pub use frame::AudioFrame;
