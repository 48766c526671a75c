//! Session worker task
//!
//! Owns all mutable pipeline state: encoders, muxer, transport, and the
//! state machine. Control commands preempt frame processing (biased
//! select), and only this task ever awaits network I/O.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::audio::{AudioEncoder, AudioFrame};
use crate::capture::CaptureSource;
use crate::config::{FaultPolicy, ReconnectConfig, SessionConfig};
use crate::error::{LiveError, MediaKind};
use crate::events::{EventChannel, SessionEvent};
use crate::mux::{Muxer, Packet};
use crate::transport::Transport;
use crate::video::{VideoEncoder, VideoFrame};

use super::queue::BoundedQueue;
use super::stats::SessionStats;
use super::{Command, Pipeline, SessionState};

/// Worker loop control flow
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// One pending media sample, popped in interleaved timestamp order
enum Sample {
    Video(VideoFrame),
    Audio(AudioFrame),
}

/// Faults raised by one pipeline pass (encode -> mux -> send)
enum PipelineFault {
    /// Transport send failed or timed out; recoverable via reconnect
    Send(String),
    /// Encoder failed; handled per the configured fault policy
    Encoder { media: MediaKind, error: LiveError },
}

pub(crate) struct Worker {
    config: SessionConfig,
    source: Arc<dyn CaptureSource>,
    video_encoder: Box<dyn VideoEncoder>,
    audio_encoder: Box<dyn AudioEncoder>,
    muxer: Box<dyn Muxer>,
    transport: Box<dyn Transport>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<SessionState>,
    video_queue: Arc<BoundedQueue<VideoFrame>>,
    audio_queue: Arc<BoundedQueue<AudioFrame>>,
    stats: Arc<SessionStats>,
    events: Arc<EventChannel>,
    cancel: CancellationToken,

    target_url: Option<Url>,
    muted: bool,
    video_faulted: bool,
    audio_faulted: bool,
    /// Consecutive failed connect attempts
    attempt: u32,

    next_stats_at: Instant,
    window_start: Instant,
    window_bytes: u64,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SessionConfig,
        source: Arc<dyn CaptureSource>,
        pipeline: Pipeline,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<SessionState>,
        video_queue: Arc<BoundedQueue<VideoFrame>>,
        audio_queue: Arc<BoundedQueue<AudioFrame>>,
        stats: Arc<SessionStats>,
        events: Arc<EventChannel>,
        cancel: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        let stats_interval = Duration::from_millis(config.stats_interval_ms);
        Self {
            config,
            source,
            video_encoder: pipeline.video_encoder,
            audio_encoder: pipeline.audio_encoder,
            muxer: pipeline.muxer,
            transport: pipeline.transport,
            cmd_rx,
            state_tx,
            video_queue,
            audio_queue,
            stats,
            events,
            cancel,
            target_url: None,
            muted: false,
            video_faulted: false,
            audio_faulted: false,
            attempt: 0,
            next_stats_at: now + stats_interval,
            window_start: now,
            window_bytes: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Session worker started");
        loop {
            let flow = match self.state() {
                SessionState::Idle | SessionState::Error => self.idle_phase().await,
                SessionState::Pending | SessionState::Refreshing => self.connect_phase().await,
                SessionState::Live => self.live_phase().await,
            };
            if flow == Flow::Shutdown {
                break;
            }
        }
        self.transport.close().await;
        info!("Session worker stopped");
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Transition state, emitting an event only on an actual change
    fn set_state(&self, new: SessionState) {
        let previous = self.state();
        if previous == new {
            return;
        }
        let _ = self.state_tx.send(new);
        info!("Session state: {} -> {}", previous, new);
        self.events.publish(SessionEvent::StateChanged {
            state: new,
            previous,
        });
    }

    /// Idle/Error: nothing flows, wait for commands
    async fn idle_phase(&mut self) -> Flow {
        let cancel = self.cancel.clone();
        tokio::select! { biased;
            _ = cancel.cancelled() => Flow::Shutdown,
            cmd = self.cmd_rx.recv() => match cmd {
                Some(cmd) => self.handle_command(cmd).await,
                None => Flow::Shutdown,
            },
        }
    }

    /// Pending/Refreshing: drive one connect attempt, with backoff on retries
    async fn connect_phase(&mut self) -> Flow {
        let cancel = self.cancel.clone();

        if self.attempt > 0 {
            let delay = backoff_delay(&self.config.reconnect, self.attempt);
            debug!(
                attempt = self.attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnect backoff"
            );
            tokio::select! { biased;
                _ = cancel.cancelled() => return Flow::Shutdown,
                cmd = self.cmd_rx.recv() => return match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => Flow::Shutdown,
                },
                _ = sleep(delay) => {}
            }
        }

        let Some(url) = self.target_url.clone() else {
            warn!("Connect phase without a target URL, returning to idle");
            self.set_state(SessionState::Idle);
            return Flow::Continue;
        };

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let result = tokio::select! { biased;
            _ = cancel.cancelled() => return Flow::Shutdown,
            // A stop command arriving here drops the in-flight open
            cmd = self.cmd_rx.recv() => return match cmd {
                Some(cmd) => self.handle_command(cmd).await,
                None => Flow::Shutdown,
            },
            result = timeout(connect_timeout, self.transport.open(&url)) => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "connect timed out after {}ms",
                    self.config.connect_timeout_ms
                )),
            },
        };

        match result {
            Ok(()) => self.on_connected(),
            Err(reason) => self.on_connect_fault(reason).await,
        }
        Flow::Continue
    }

    fn on_connected(&mut self) {
        self.attempt = 0;
        // Fresh connection: replay the container header and resync on a
        // keyframe so the ingest can decode without ambiguity
        self.muxer.reset();
        if let Err(e) = self.video_encoder.reset() {
            warn!("Video encoder reset failed: {}", e);
        }
        if let Err(e) = self.audio_encoder.reset() {
            warn!("Audio encoder reset failed: {}", e);
        }
        self.video_encoder.force_keyframe();
        self.reset_stats_window();
        self.set_state(SessionState::Live);
    }

    async fn on_connect_fault(&mut self, reason: String) {
        self.stats.record_connect_fault();
        self.attempt += 1;
        warn!(
            "Connect attempt {}/{} failed: {}",
            self.attempt, self.config.reconnect.max_attempts, reason
        );

        if self.attempt >= self.config.reconnect.max_attempts {
            let err = LiveError::RetryExhausted {
                attempts: self.attempt,
                last_error: reason,
            };
            error!("{}", err);
            self.events.publish(SessionEvent::error(&err));
            self.fail_session().await;
        } else {
            self.set_state(SessionState::Refreshing);
        }
    }

    /// Live: pump samples through encode -> mux -> send, commands first
    async fn live_phase(&mut self) -> Flow {
        let cancel = self.cancel.clone();
        let video_queue = self.video_queue.clone();
        let audio_queue = self.audio_queue.clone();
        let video_ready = !self.video_faulted;
        let audio_ready = !self.audio_faulted;

        tokio::select! { biased;
            _ = cancel.cancelled() => return Flow::Shutdown,
            cmd = self.cmd_rx.recv() => return match cmd {
                Some(cmd) => self.handle_command(cmd).await,
                None => Flow::Shutdown,
            },
            _ = sleep_until(self.next_stats_at) => {
                self.emit_stats();
                return Flow::Continue;
            }
            _ = video_queue.wait_nonempty(), if video_ready => {}
            _ = audio_queue.wait_nonempty(), if audio_ready => {}
        }

        let Some(sample) = self.pop_next_sample() else {
            return Flow::Continue;
        };

        match self.encode_and_send(sample).await {
            Ok(()) => {}
            Err(PipelineFault::Send(reason)) => {
                warn!("Send fault, refreshing connection: {}", reason);
                self.transport.close().await;
                self.set_state(SessionState::Refreshing);
            }
            Err(PipelineFault::Encoder { media, error }) => {
                self.on_encoder_fault(media, error).await;
            }
        }
        Flow::Continue
    }

    async fn handle_command(&mut self, cmd: Command) -> Flow {
        match cmd {
            Command::Start { url } => {
                if matches!(self.state(), SessionState::Idle | SessionState::Error) {
                    self.video_queue.clear();
                    self.audio_queue.clear();
                    self.video_queue.reset_watermark();
                    self.audio_queue.reset_watermark();
                    self.video_faulted = false;
                    self.audio_faulted = false;
                    self.attempt = 0;
                    self.target_url = Some(url);
                    self.set_state(SessionState::Pending);
                } else {
                    warn!("Ignoring start command while {}", self.state());
                }
                Flow::Continue
            }
            Command::Stop => {
                self.stop_stream(true).await;
                Flow::Continue
            }
            Command::ConfigureDevice { camera, microphone } => {
                self.source.set_device_running(camera, microphone);
                info!(camera, microphone, "Device solicitation changed");
                Flow::Continue
            }
            Command::SetMute(muted) => {
                self.muted = muted;
                info!("Audio mute set to {}", muted);
                Flow::Continue
            }
            Command::Shutdown => {
                // Force-stop: skip the flush, close promptly
                self.stop_stream(false).await;
                Flow::Shutdown
            }
        }
    }

    /// Stop streaming and return to Idle; no-op when already idle
    async fn stop_stream(&mut self, flush: bool) {
        if self.state() == SessionState::Idle {
            return;
        }
        info!("Stopping session");

        if flush && self.transport.is_open() {
            self.flush_pending().await;
        }

        let discarded = self.video_queue.clear() + self.audio_queue.clear();
        if discarded > 0 {
            debug!("Discarded {} pending frames on stop", discarded);
            for _ in 0..discarded {
                self.stats.record_dropped_frame();
            }
        }

        self.transport.close().await;
        if let Err(e) = self.video_encoder.reset() {
            warn!("Video encoder reset failed: {}", e);
        }
        if let Err(e) = self.audio_encoder.reset() {
            warn!("Audio encoder reset failed: {}", e);
        }
        self.muxer.reset();
        self.video_queue.reset_watermark();
        self.audio_queue.reset_watermark();
        self.target_url = None;
        self.attempt = 0;
        self.set_state(SessionState::Idle);
    }

    /// Best-effort delivery of pending samples within the stop grace period
    async fn flush_pending(&mut self) {
        let deadline = Instant::now() + Duration::from_millis(self.config.stop_flush_timeout_ms);
        let mut flushed = 0usize;
        while Instant::now() < deadline {
            let Some(sample) = self.pop_next_sample() else {
                break;
            };
            if self.encode_and_send(sample).await.is_err() {
                break;
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!("Flushed {} pending samples on stop", flushed);
        }
    }

    /// Pop whichever pending sample is oldest across both media queues
    fn pop_next_sample(&mut self) -> Option<Sample> {
        let video_ts = if self.video_faulted {
            None
        } else {
            self.video_queue.peek_timestamp()
        };
        let audio_ts = if self.audio_faulted {
            None
        } else {
            self.audio_queue.peek_timestamp()
        };

        match (video_ts, audio_ts) {
            (Some(v), Some(a)) if a < v => self.audio_queue.try_pop().map(Sample::Audio),
            (Some(_), _) => self.video_queue.try_pop().map(Sample::Video),
            (None, Some(_)) => self.audio_queue.try_pop().map(Sample::Audio),
            (None, None) => None,
        }
    }

    /// One pipeline pass: encode the sample, mux it, send the packets
    async fn encode_and_send(&mut self, sample: Sample) -> Result<(), PipelineFault> {
        match sample {
            Sample::Video(frame) => {
                trace!(ts_ms = frame.timestamp_ms, len = frame.len(), "Encoding video frame");
                match self.video_encoder.encode(&frame) {
                    Ok(unit) => {
                        let packets = self.muxer.mux_video(&unit);
                        self.send_packets(packets).await
                    }
                    Err(error) => {
                        self.stats.record_encoder_fault();
                        Err(PipelineFault::Encoder {
                            media: MediaKind::Video,
                            error,
                        })
                    }
                }
            }
            Sample::Audio(frame) => {
                // Muted audio is encoded as silence at the same cadence so
                // the mux timeline stays contiguous
                let frame = if self.muted { frame.silenced() } else { frame };
                match self.audio_encoder.encode(&frame) {
                    Ok(unit) => {
                        let packets = self.muxer.mux_audio(&unit);
                        self.send_packets(packets).await
                    }
                    Err(error) => {
                        self.stats.record_encoder_fault();
                        Err(PipelineFault::Encoder {
                            media: MediaKind::Audio,
                            error,
                        })
                    }
                }
            }
        }
    }

    async fn send_packets(&mut self, packets: Vec<Packet>) -> Result<(), PipelineFault> {
        let send_timeout = Duration::from_millis(self.config.send_timeout_ms);
        for packet in packets {
            let bytes = packet.len();
            match timeout(send_timeout, self.transport.send(&packet)).await {
                Ok(Ok(())) => {
                    self.stats.record_packet_sent(bytes);
                    self.window_bytes += bytes as u64;
                    trace!(ts_ms = packet.timestamp_ms, bytes, "Packet sent");
                }
                Ok(Err(e)) => {
                    self.stats.record_send_fault();
                    return Err(PipelineFault::Send(e.to_string()));
                }
                Err(_) => {
                    self.stats.record_send_fault();
                    return Err(PipelineFault::Send(format!(
                        "send timed out after {}ms",
                        self.config.send_timeout_ms
                    )));
                }
            }
        }
        Ok(())
    }

    async fn on_encoder_fault(&mut self, media: MediaKind, error: LiveError) {
        let policy = match media {
            MediaKind::Video => self.config.video_fault_policy,
            MediaKind::Audio => self.config.audio_fault_policy,
        };
        match policy {
            FaultPolicy::Abort => {
                error!("Fatal {} encoder fault: {}", media, error);
                self.events.publish(SessionEvent::error(&error));
                self.fail_session().await;
            }
            FaultPolicy::Degrade => {
                warn!("{} encoder fault, dropping that stream: {}", media, error);
                match media {
                    MediaKind::Video => {
                        self.video_faulted = true;
                        self.video_queue.clear();
                    }
                    MediaKind::Audio => {
                        self.audio_faulted = true;
                        self.audio_queue.clear();
                    }
                }
                if self.video_faulted && self.audio_faulted {
                    let err = LiveError::Encoder {
                        media,
                        reason: "both media streams faulted".to_string(),
                    };
                    error!("{}", err);
                    self.events.publish(SessionEvent::error(&err));
                    self.fail_session().await;
                }
            }
        }
    }

    /// Enter the terminal Error state, releasing the connection and queues
    async fn fail_session(&mut self) {
        self.transport.close().await;
        let discarded = self.video_queue.clear() + self.audio_queue.clear();
        for _ in 0..discarded {
            self.stats.record_dropped_frame();
        }
        self.set_state(SessionState::Error);
    }

    fn emit_stats(&mut self) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.window_start).as_millis() as u64;
        let bps = if elapsed_ms > 0 {
            self.window_bytes * 8 * 1000 / elapsed_ms
        } else {
            0
        };
        self.stats.set_bitrate_estimate(bps);
        self.stats.set_queue_depth(self.video_queue.len());
        self.events
            .publish(SessionEvent::Statistics(self.stats.report()));

        self.window_start = now;
        self.window_bytes = 0;
        self.next_stats_at = now + Duration::from_millis(self.config.stats_interval_ms);
    }

    fn reset_stats_window(&mut self) {
        let now = Instant::now();
        self.window_start = now;
        self.window_bytes = 0;
        self.next_stats_at = now + Duration::from_millis(self.config.stats_interval_ms);
    }
}

/// Exponential backoff with jitter for reconnect attempt `attempt` (1-based)
fn backoff_delay(config: &ReconnectConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let base = config
        .base_delay_ms
        .saturating_mul(1u64 << exp)
        .min(config.max_delay_ms);
    let jitter = if config.jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=config.jitter_ms)
    } else {
        0
    };
    Duration::from_millis(base.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconnect(base: u64, max: u64, jitter: u64) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: 5,
            base_delay_ms: base,
            max_delay_ms: max,
            jitter_ms: jitter,
        }
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let config = reconnect(100, 10_000, 0);
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let config = reconnect(100, 300, 0);
        assert_eq!(backoff_delay(&config, 4), Duration::from_millis(300));
        assert_eq!(backoff_delay(&config, 30), Duration::from_millis(300));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let config = reconnect(100, 10_000, 50);
        for _ in 0..100 {
            let delay = backoff_delay(&config, 1).as_millis() as u64;
            assert!((100..=150).contains(&delay));
        }
    }
}
