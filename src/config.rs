use serde::{Deserialize, Serialize};

use crate::video::format::Resolution;

/// Session configuration
///
/// Set at construction and immutable for the session's lifetime. Device
/// toggles and mute are runtime state on the session, not configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Video encoder profile
    pub video: VideoProfile,
    /// Audio encoder profile
    pub audio: AudioProfile,
    /// Reconnect policy
    pub reconnect: ReconnectConfig,
    /// Pending-frame queue bounds
    pub queue: QueueConfig,
    /// Encoder fault policy for the video stream
    pub video_fault_policy: FaultPolicy,
    /// Encoder fault policy for the audio stream
    pub audio_fault_policy: FaultPolicy,
    /// Transport connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Transport send timeout in milliseconds
    pub send_timeout_ms: u64,
    /// Grace period for the best-effort queue flush on stop, in milliseconds
    pub stop_flush_timeout_ms: u64,
    /// Statistics reporting interval in milliseconds
    pub stats_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            video: VideoProfile::default(),
            audio: AudioProfile::default(),
            reconnect: ReconnectConfig::default(),
            queue: QueueConfig::default(),
            video_fault_policy: FaultPolicy::Abort,
            audio_fault_policy: FaultPolicy::Degrade,
            connect_timeout_ms: 5000,
            send_timeout_ms: 5000,
            stop_flush_timeout_ms: 1000,
            stats_interval_ms: 2000,
        }
    }
}

/// Video encoder profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VideoProfile {
    /// Target resolution
    pub resolution: Resolution,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Target frame rate
    pub fps: u32,
    /// Keyframe interval in frames
    pub gop_size: u32,
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            resolution: Resolution::HD720,
            bitrate_kbps: 1500,
            fps: 30,
            gop_size: 60,
        }
    }
}

impl VideoProfile {
    /// Low-latency profile for poor uplinks
    pub fn low() -> Self {
        Self {
            resolution: Resolution::SD480,
            bitrate_kbps: 600,
            fps: 15,
            gop_size: 30,
        }
    }

    /// High-quality profile
    pub fn high() -> Self {
        Self {
            resolution: Resolution::HD1080,
            bitrate_kbps: 3000,
            fps: 30,
            gop_size: 60,
        }
    }
}

/// Audio encoder profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioProfile {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count (1 or 2)
    pub channels: u32,
    /// Target bitrate in bps
    pub bitrate: u32,
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bitrate: 96000,
        }
    }
}

/// Reconnect policy configuration
///
/// Connect and mid-stream send faults trigger bounded retries with
/// exponential backoff plus a uniform jitter term. A successful reconnect
/// resets the attempt counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum consecutive attempts before the session enters Error
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (doubled per attempt)
    pub base_delay_ms: u64,
    /// Backoff delay ceiling in milliseconds
    pub max_delay_ms: u64,
    /// Maximum uniform jitter added to each delay, in milliseconds
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_ms: 250,
        }
    }
}

/// Pending-frame queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Video frame queue capacity (default ~3s at 30fps)
    pub video_capacity: usize,
    /// Audio frame queue capacity
    pub audio_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            video_capacity: 90,
            audio_capacity: 150,
        }
    }
}

/// What the session does when an encoder reports a fatal fault
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Abort the whole session (enters Error state)
    Abort,
    /// Drop the faulted media type and continue with the other
    Degrade,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.video.fps, 30);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.video_fault_policy, FaultPolicy::Abort);
        assert_eq!(config.audio_fault_policy, FaultPolicy::Degrade);
    }

    #[test]
    fn test_video_profiles() {
        assert!(VideoProfile::low().bitrate_kbps < VideoProfile::high().bitrate_kbps);
        assert_eq!(VideoProfile::high().resolution, Resolution::HD1080);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.video, config.video);
        assert_eq!(parsed.reconnect, config.reconnect);
    }

    #[test]
    fn test_partial_deserialization() {
        // Unspecified fields fall back to defaults
        let config: SessionConfig =
            serde_json::from_str(r#"{"reconnect":{"max_attempts":5}}"#).unwrap();
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay_ms, 500);
        assert_eq!(config.queue.video_capacity, 90);
    }
}
