//! Muxing: encoded sample units -> interleaved wire packets

pub mod flv;

use bytes::Bytes;

use crate::audio::EncodedAudio;
use crate::video::EncodedFrame;

pub use flv::{FlvMuxer, FlvMuxerConfig};

/// Wire packet kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Container/stream header
    Header,
    /// Video tag
    Video { key_frame: bool },
    /// Audio tag
    Audio,
}

/// A muxed, wire-ready unit
///
/// Owned by the transport from `send` until the write completes.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Wire payload
    pub data: Bytes,
    /// Presentation timestamp in milliseconds
    pub timestamp_ms: u64,
    /// Packet kind
    pub kind: PacketKind,
    /// Whether this packet begins a new mux segment (video keyframes)
    pub segment_start: bool,
}

impl Packet {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_video(&self) -> bool {
        matches!(self.kind, PacketKind::Video { .. })
    }

    pub fn is_key_frame(&self) -> bool {
        matches!(self.kind, PacketKind::Video { key_frame: true })
    }
}

/// Muxer trait
///
/// Packages encoded sample units into a wire container. Implementations
/// must emit packets in non-decreasing timestamp order across both media
/// types, and must start a new segment on every video keyframe so a
/// reconnect can resume without downstream decode ambiguity.
pub trait Muxer: Send {
    /// Mux an encoded video sample unit into zero or more packets
    fn mux_video(&mut self, unit: &EncodedFrame) -> Vec<Packet>;

    /// Mux an encoded audio sample unit into zero or more packets
    fn mux_audio(&mut self, unit: &EncodedAudio) -> Vec<Packet>;

    /// Reset mux state for a fresh connection
    ///
    /// The next packet after a reset is preceded by the container header.
    fn reset(&mut self);

    /// Index of the current segment (increments on each keyframe)
    fn segment_index(&self) -> u64;
}
