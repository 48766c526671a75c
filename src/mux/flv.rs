//! FLV muxer
//!
//! Assembles encoded sample units into FLV tags: a 9-byte file header
//! followed by a previous-tag-size chain of audio/video tags with 24-bit
//! payload sizes and split 32-bit timestamps.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use super::{Muxer, Packet, PacketKind};
use crate::audio::EncodedAudio;
use crate::video::{EncodedFormat, EncodedFrame};

/// FLV tag types
const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;

/// FLV header size (signature + version + flags + data offset)
const HEADER_SIZE: u32 = 9;

/// Tag header size (type + size + timestamp + stream id)
const TAG_HEADER_SIZE: usize = 11;

/// FLV muxer configuration
#[derive(Debug, Clone)]
pub struct FlvMuxerConfig {
    /// Whether the stream carries video
    pub has_video: bool,
    /// Whether the stream carries audio
    pub has_audio: bool,
    /// Audio sample rate (for the audio tag header bits)
    pub audio_sample_rate: u32,
    /// Audio channel count
    pub audio_channels: u32,
}

impl Default for FlvMuxerConfig {
    fn default() -> Self {
        Self {
            has_video: true,
            has_audio: true,
            audio_sample_rate: 44100,
            audio_channels: 2,
        }
    }
}

/// FLV muxer
///
/// Emitted packet timestamps are clamped to be non-decreasing across both
/// media types. Every video keyframe begins a new segment; the file header
/// is emitted before the first tag after construction or `reset`.
pub struct FlvMuxer {
    config: FlvMuxerConfig,
    header_sent: bool,
    last_timestamp_ms: u64,
    segment: u64,
}

impl FlvMuxer {
    pub fn new(config: FlvMuxerConfig) -> Self {
        Self {
            config,
            header_sent: false,
            last_timestamp_ms: 0,
            segment: 0,
        }
    }

    /// Build the FLV file header packet
    fn header_packet(&self) -> Packet {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize + 4);
        buf.put_slice(b"FLV");
        buf.put_u8(1);
        let mut flags = 0u8;
        if self.config.has_audio {
            flags |= 0x04;
        }
        if self.config.has_video {
            flags |= 0x01;
        }
        buf.put_u8(flags);
        buf.put_u32(HEADER_SIZE);
        // PreviousTagSize0
        buf.put_u32(0);

        Packet {
            data: buf.freeze(),
            timestamp_ms: 0,
            kind: PacketKind::Header,
            segment_start: false,
        }
    }

    /// Clamp a sample timestamp so output stays non-decreasing
    fn clamp_timestamp(&mut self, timestamp_ms: u64) -> u64 {
        let ts = timestamp_ms.max(self.last_timestamp_ms);
        self.last_timestamp_ms = ts;
        ts
    }

    /// Assemble one FLV tag (header + payload + previous tag size)
    fn build_tag(tag_type: u8, timestamp_ms: u64, payload: &[&[u8]]) -> Bytes {
        let data_size: usize = payload.iter().map(|p| p.len()).sum();
        debug_assert!(data_size <= 0x00FF_FFFF, "FLV tag payload too large");

        let mut buf = BytesMut::with_capacity(TAG_HEADER_SIZE + data_size + 4);
        buf.put_u8(tag_type);
        // 24-bit data size
        buf.put_u8((data_size >> 16) as u8);
        buf.put_u8((data_size >> 8) as u8);
        buf.put_u8(data_size as u8);
        // 24-bit timestamp + 8-bit extension
        let ts = timestamp_ms as u32;
        buf.put_u8((ts >> 16) as u8);
        buf.put_u8((ts >> 8) as u8);
        buf.put_u8(ts as u8);
        buf.put_u8((ts >> 24) as u8);
        // Stream ID, always 0
        buf.put_u8(0);
        buf.put_u8(0);
        buf.put_u8(0);
        for part in payload {
            buf.put_slice(part);
        }
        buf.put_u32((TAG_HEADER_SIZE + data_size) as u32);
        buf.freeze()
    }

    /// FLV VideoTagHeader codec id for an encoder output format
    fn video_codec_id(format: EncodedFormat) -> u8 {
        match format {
            EncodedFormat::H264 => 7,
            // HEVC-in-FLV uses the widely deployed enhanced id
            EncodedFormat::H265 => 12,
            EncodedFormat::Raw => 0,
        }
    }

    /// FLV AudioTagHeader byte for the configured PCM/AAC-style stream
    fn audio_tag_header(&self) -> u8 {
        // SoundFormat 3 = PCM little-endian
        let format = 3u8;
        let rate = match self.config.audio_sample_rate {
            r if r >= 44100 => 3u8,
            r if r >= 22050 => 2,
            r if r >= 11025 => 1,
            _ => 0,
        };
        let size = 1u8; // 16-bit
        let stereo = u8::from(self.config.audio_channels >= 2);
        (format << 4) | (rate << 2) | (size << 1) | stereo
    }
}

impl Default for FlvMuxer {
    fn default() -> Self {
        Self::new(FlvMuxerConfig::default())
    }
}

impl Muxer for FlvMuxer {
    fn mux_video(&mut self, unit: &EncodedFrame) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(2);
        if !self.header_sent {
            packets.push(self.header_packet());
            self.header_sent = true;
        }

        let ts = self.clamp_timestamp(unit.timestamp_ms);
        let segment_start = unit.key_frame;
        if segment_start {
            self.segment += 1;
            trace!(segment = self.segment, ts_ms = ts, "New mux segment");
        }

        let frame_type = if unit.key_frame { 1u8 } else { 2u8 };
        let video_header = [(frame_type << 4) | Self::video_codec_id(unit.format)];
        let data = Self::build_tag(TAG_VIDEO, ts, &[&video_header[..], &unit.data[..]]);

        packets.push(Packet {
            data,
            timestamp_ms: ts,
            kind: PacketKind::Video {
                key_frame: unit.key_frame,
            },
            segment_start,
        });
        packets
    }

    fn mux_audio(&mut self, unit: &EncodedAudio) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(2);
        if !self.header_sent {
            packets.push(self.header_packet());
            self.header_sent = true;
        }

        let ts = self.clamp_timestamp(unit.timestamp_ms);
        let audio_header = [self.audio_tag_header()];
        let data = Self::build_tag(TAG_AUDIO, ts, &[&audio_header[..], &unit.data[..]]);

        packets.push(Packet {
            data,
            timestamp_ms: ts,
            kind: PacketKind::Audio,
            segment_start: false,
        });
        packets
    }

    fn reset(&mut self) {
        self.header_sent = false;
        self.last_timestamp_ms = 0;
    }

    fn segment_index(&self) -> u64 {
        self.segment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn video_unit(ts: u64, key: bool) -> EncodedFrame {
        EncodedFrame {
            data: Bytes::from_static(&[0xAB; 8]),
            format: EncodedFormat::H264,
            key_frame: key,
            sequence: 0,
            timestamp_ms: ts,
        }
    }

    fn audio_unit(ts: u64) -> EncodedAudio {
        EncodedAudio {
            data: Bytes::from_static(&[0xCD; 4]),
            duration_ms: 20,
            sequence: 0,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_header_emitted_once() {
        let mut muxer = FlvMuxer::default();
        let first = muxer.mux_video(&video_unit(0, true));
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].kind, PacketKind::Header);
        assert_eq!(&first[0].data[..3], b"FLV");
        // audio + video flags
        assert_eq!(first[0].data[4], 0x05);

        let second = muxer.mux_video(&video_unit(33, false));
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_header_replayed_after_reset() {
        let mut muxer = FlvMuxer::default();
        muxer.mux_video(&video_unit(0, true));
        muxer.reset();
        let packets = muxer.mux_audio(&audio_unit(10));
        assert_eq!(packets[0].kind, PacketKind::Header);
    }

    #[test]
    fn test_video_tag_layout() {
        let mut muxer = FlvMuxer::default();
        let packets = muxer.mux_video(&video_unit(0x012345, true));
        let tag = &packets[1].data;

        assert_eq!(tag[0], TAG_VIDEO);
        // Payload: 1-byte video header + 8 bytes data
        assert_eq!(&tag[1..4], &[0, 0, 9]);
        // Timestamp split: lower 24 bits then upper 8
        assert_eq!(&tag[4..8], &[0x01, 0x23, 0x45, 0x00]);
        // Stream ID
        assert_eq!(&tag[8..11], &[0, 0, 0]);
        // Keyframe + AVC
        assert_eq!(tag[11], 0x17);
        // PreviousTagSize = 11 + 9
        assert_eq!(&tag[tag.len() - 4..], &20u32.to_be_bytes());
    }

    #[test]
    fn test_keyframe_starts_segment() {
        let mut muxer = FlvMuxer::default();
        assert_eq!(muxer.segment_index(), 0);

        let packets = muxer.mux_video(&video_unit(0, true));
        assert!(packets[1].segment_start);
        assert_eq!(muxer.segment_index(), 1);

        let packets = muxer.mux_video(&video_unit(33, false));
        assert!(!packets[0].segment_start);
        assert_eq!(muxer.segment_index(), 1);

        let packets = muxer.mux_video(&video_unit(66, true));
        assert!(packets[0].segment_start);
        assert_eq!(muxer.segment_index(), 2);
    }

    #[test]
    fn test_timestamps_non_decreasing_across_media() {
        let mut muxer = FlvMuxer::default();
        muxer.mux_video(&video_unit(100, true));
        // Audio arriving with an older timestamp gets clamped forward
        let packets = muxer.mux_audio(&audio_unit(80));
        let audio = packets.last().unwrap();
        assert_eq!(audio.timestamp_ms, 100);

        let packets = muxer.mux_video(&video_unit(120, false));
        assert_eq!(packets[0].timestamp_ms, 120);
    }

    #[test]
    fn test_audio_tag_header_bits() {
        let muxer = FlvMuxer::new(FlvMuxerConfig {
            audio_sample_rate: 44100,
            audio_channels: 2,
            ..Default::default()
        });
        // PCM LE (3), 44kHz (3), 16-bit (1), stereo (1)
        assert_eq!(muxer.audio_tag_header(), 0x3F);
    }
}
