//! Session statistics counters
//!
//! Every fault increments a counter here even when it is not surfaced as
//! an error event, so nothing fails silently.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::events::StatsReport;

/// Shared atomic counters between the caller-facing session and its worker
#[derive(Debug, Default)]
pub struct SessionStats {
    dropped_frames: AtomicU64,
    connect_faults: AtomicU64,
    send_faults: AtomicU64,
    encoder_faults: AtomicU64,
    frames_pushed: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    bitrate_bps_estimate: AtomicU64,
    queue_depth: AtomicUsize,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dropped_frame(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_fault(&self) {
        self.connect_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_fault(&self) {
        self.send_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoder_fault(&self) {
        self.encoder_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_pushed(&self) {
        self.frames_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn set_bitrate_estimate(&self, bps: u64) {
        self.bitrate_bps_estimate.store(bps, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn connect_faults(&self) -> u64 {
        self.connect_faults.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Snapshot all counters
    pub fn report(&self) -> StatsReport {
        StatsReport {
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            connect_faults: self.connect_faults.load(Ordering::Relaxed),
            send_faults: self.send_faults.load(Ordering::Relaxed),
            encoder_faults: self.encoder_faults.load(Ordering::Relaxed),
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bitrate_bps_estimate: self.bitrate_bps_estimate.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_report() {
        let stats = SessionStats::new();
        stats.record_dropped_frame();
        stats.record_dropped_frame();
        stats.record_connect_fault();
        stats.record_packet_sent(100);
        stats.record_packet_sent(50);
        stats.set_queue_depth(3);

        let report = stats.report();
        assert_eq!(report.dropped_frames, 2);
        assert_eq!(report.connect_faults, 1);
        assert_eq!(report.packets_sent, 2);
        assert_eq!(report.bytes_sent, 150);
        assert_eq!(report.queue_depth, 3);
    }
}
