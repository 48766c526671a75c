//! Live-push session engine
//!
//! [`LiveSession`] ties the pipeline together: a state machine plus bounded
//! buffering, backpressure, and reconnect policy, running on a dedicated
//! worker task. All public operations enqueue a command or a frame and
//! return immediately; the caller never blocks on network I/O.

pub mod queue;
pub mod stats;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};
use url::Url;

use crate::audio::{AudioEncoder, AudioEncoderConfig, AudioFrame, PcmAudioEncoder};
use crate::capture::CaptureSource;
use crate::config::SessionConfig;
use crate::error::{LiveError, Result};
use crate::events::{EventChannel, EventReceiver, StatsReport};
use crate::mux::{FlvMuxer, FlvMuxerConfig, Muxer};
use crate::transport::{TcpTransport, Transport};
use crate::video::{PassthroughVideoEncoder, VideoEncoder, VideoFrame};

use queue::{BoundedQueue, PushOutcome};
use stats::SessionStats;
use worker::Worker;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Not streaming
    #[default]
    Idle,
    /// Connecting to the ingest endpoint
    Pending,
    /// Streaming
    Live,
    /// Transient reconnect in progress
    Refreshing,
    /// Terminal until the caller starts again
    Error,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Pending => write!(f, "pending"),
            SessionState::Live => write!(f, "live"),
            SessionState::Refreshing => write!(f, "refreshing"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

/// Control commands from the caller to the worker
///
/// Processed in submission order, with priority over pending frames.
#[derive(Debug)]
pub(crate) enum Command {
    Start { url: Url },
    Stop,
    ConfigureDevice { camera: bool, microphone: bool },
    SetMute(bool),
    Shutdown,
}

/// Injected pipeline components
///
/// The session owns these for its lifetime; they move onto the worker task
/// at construction.
pub struct Pipeline {
    pub video_encoder: Box<dyn VideoEncoder>,
    pub audio_encoder: Box<dyn AudioEncoder>,
    pub muxer: Box<dyn Muxer>,
    pub transport: Box<dyn Transport>,
}

impl Pipeline {
    /// Default pipeline: passthrough encoders, FLV mux, framed TCP transport
    pub fn flv_tcp(config: &SessionConfig) -> Self {
        Self {
            video_encoder: Box::new(PassthroughVideoEncoder::default()),
            audio_encoder: Box::new(PcmAudioEncoder::new(AudioEncoderConfig {
                profile: config.audio.clone(),
            })),
            muxer: Box::new(FlvMuxer::new(FlvMuxerConfig {
                has_video: true,
                has_audio: true,
                audio_sample_rate: config.audio.sample_rate,
                audio_channels: config.audio.channels,
            })),
            transport: Box::new(TcpTransport::new()),
        }
    }
}

/// Live-push session
///
/// Construct with a capture source and an injected [`Pipeline`], then drive
/// with `start`/`stop`/`push_frame`. Must be created inside a tokio runtime
/// (the worker task is spawned at construction).
pub struct LiveSession {
    config: SessionConfig,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<SessionState>,
    video_queue: Arc<BoundedQueue<VideoFrame>>,
    audio_queue: Arc<BoundedQueue<AudioFrame>>,
    stats: Arc<SessionStats>,
    events: Arc<EventChannel>,
    cancel: CancellationToken,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    video_enabled: AtomicBool,
    audio_enabled: AtomicBool,
    muted: AtomicBool,
}

impl LiveSession {
    /// Create a session and spawn its worker task
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn CaptureSource>,
        pipeline: Pipeline,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let video_queue = Arc::new(BoundedQueue::new(config.queue.video_capacity));
        let audio_queue = Arc::new(BoundedQueue::new(config.queue.audio_capacity));
        let stats = Arc::new(SessionStats::new());
        let events = Arc::new(EventChannel::new());
        let cancel = CancellationToken::new();

        let worker = Worker::new(
            config.clone(),
            source,
            pipeline,
            cmd_rx,
            state_tx,
            video_queue.clone(),
            audio_queue.clone(),
            stats.clone(),
            events.clone(),
            cancel.clone(),
        );
        let worker_handle = tokio::spawn(worker.run());

        Self {
            config,
            cmd_tx,
            state_rx,
            video_queue,
            audio_queue,
            stats,
            events,
            cancel,
            worker_handle: Mutex::new(Some(worker_handle)),
            video_enabled: AtomicBool::new(true),
            audio_enabled: AtomicBool::new(true),
            muted: AtomicBool::new(false),
        }
    }

    /// Start pushing to the given ingest URL
    ///
    /// Valid from `Idle` or `Error`. Validates the URL synchronously, then
    /// connects asynchronously on the worker; watch `state_watch()` or the
    /// event channel for `Pending` → `Live`.
    pub fn start(&self, url: &str) -> Result<()> {
        let state = self.state();
        if !matches!(state, SessionState::Idle | SessionState::Error) {
            return Err(LiveError::Config(format!(
                "cannot start while session is {state}"
            )));
        }

        let url = Self::validate_url(url)?;
        info!("Starting live session to {}", url);
        self.send_command(Command::Start { url })
    }

    /// Stop streaming
    ///
    /// Flushes pending frames best-effort within the configured grace
    /// period, closes the transport and returns the session to `Idle`.
    /// No-op when already `Idle`.
    pub fn stop(&self) {
        let _ = self.send_command(Command::Stop);
    }

    /// Push a raw video frame, never blocking
    ///
    /// Buffered while `Pending`/`Live`/`Refreshing` (up to the queue bound,
    /// oldest dropped first); dropped and counted while `Idle`/`Error`.
    pub fn push_frame(&self, frame: VideoFrame) {
        match self.state() {
            SessionState::Idle | SessionState::Error => {
                trace!("Dropping frame pushed while {}", self.state());
                self.stats.record_dropped_frame();
            }
            _ => {
                self.stats.record_frame_pushed();
                match self.video_queue.push(frame) {
                    PushOutcome::Queued => {}
                    PushOutcome::DroppedOldest | PushOutcome::RejectedStale => {
                        self.stats.record_dropped_frame();
                    }
                }
            }
        }
    }

    /// Push a block of raw PCM audio, never blocking
    pub fn push_audio(&self, frame: AudioFrame) {
        match self.state() {
            SessionState::Idle | SessionState::Error => {
                self.stats.record_dropped_frame();
            }
            _ => match self.audio_queue.push(frame) {
                PushOutcome::Queued => {}
                PushOutcome::DroppedOldest | PushOutcome::RejectedStale => {
                    self.stats.record_dropped_frame();
                }
            },
        }
    }

    /// Enable/disable raw-source solicitation for camera and microphone
    ///
    /// Forwarded to the capture source; does not change session state, and
    /// frames pushed while a device is disabled still flow.
    pub fn configure_device(&self, camera: bool, microphone: bool) {
        self.video_enabled.store(camera, Ordering::SeqCst);
        self.audio_enabled.store(microphone, Ordering::SeqCst);
        let _ = self.send_command(Command::ConfigureDevice { camera, microphone });
    }

    /// Mute or unmute audio
    ///
    /// While muted, audio sample units keep being produced at the same
    /// cadence with silent payloads, so the mux timeline stays contiguous.
    pub fn set_mute(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        let _ = self.send_command(Command::SetMute(muted));
    }

    /// Whether the session is currently live
    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Live
    }

    /// Whether camera solicitation is enabled
    pub fn is_video_enabled(&self) -> bool {
        self.video_enabled.load(Ordering::SeqCst)
    }

    /// Whether microphone solicitation is enabled
    pub fn is_audio_enabled(&self) -> bool {
        self.audio_enabled.load(Ordering::SeqCst)
    }

    /// Whether audio is currently muted
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to state changes
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Take the event receiver (at most one listener; `None` after the first call)
    pub fn events(&self) -> Option<EventReceiver> {
        self.events.subscribe()
    }

    /// Snapshot of the session statistics
    pub fn stats(&self) -> StatsReport {
        self.stats.set_queue_depth(self.video_queue.len());
        self.stats.report()
    }

    /// Session configuration (immutable)
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Force-stop and tear down the worker task
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        self.cancel.cancel();
        if let Some(handle) = self.worker_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    fn send_command(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| LiveError::Config("session is shut down".to_string()))
    }

    fn validate_url(raw: &str) -> Result<Url> {
        if raw.trim().is_empty() {
            return Err(LiveError::Config("target URL is empty".to_string()));
        }
        let url = Url::parse(raw)
            .map_err(|e| LiveError::Config(format!("invalid URL '{raw}': {e}")))?;
        match url.scheme() {
            "rtmp" | "rtmps" | "tcp" => {}
            scheme => {
                return Err(LiveError::Config(format!(
                    "unsupported URL scheme '{scheme}'"
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(LiveError::Config(format!("URL has no host: {raw}")));
        }
        Ok(url)
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        // Force-stop if still running; the worker tears down on cancel
        let _ = self.cmd_tx.send(Command::Shutdown);
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioEncoderConfig;
    use crate::capture::NullCaptureSource;
    use crate::config::{AudioProfile, ReconnectConfig};
    use crate::events::{ErrorKind, SessionEvent};
    use crate::mux::{Packet, PacketKind};
    use crate::video::{PixelFormat, Resolution};
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Scripted transport for driving the session without a network
    #[derive(Default)]
    struct MockState {
        sent: PlMutex<Vec<Packet>>,
        open_script: PlMutex<VecDeque<bool>>,
        fail_sends: PlMutex<u32>,
        opens: AtomicU32,
        open_gate: PlMutex<Option<Arc<tokio::sync::Semaphore>>>,
    }

    #[derive(Default)]
    struct MockTransport {
        state: Arc<MockState>,
        open: bool,
    }

    impl MockTransport {
        fn new() -> (Self, Arc<MockState>) {
            let state = Arc::new(MockState::default());
            (
                Self {
                    state: state.clone(),
                    open: false,
                },
                state,
            )
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&mut self, _url: &Url) -> Result<()> {
            let gate = self.state.open_gate.lock().clone();
            if let Some(gate) = gate {
                let _ = gate.acquire().await;
            }
            self.state.opens.fetch_add(1, Ordering::SeqCst);
            let ok = self.state.open_script.lock().pop_front().unwrap_or(true);
            if ok {
                self.open = true;
                Ok(())
            } else {
                Err(LiveError::Connect("scripted connect failure".to_string()))
            }
        }

        async fn send(&mut self, packet: &Packet) -> Result<()> {
            if !self.open {
                return Err(LiveError::Send("not open".to_string()));
            }
            {
                let mut fail = self.state.fail_sends.lock();
                if *fail > 0 {
                    *fail -= 1;
                    self.open = false;
                    return Err(LiveError::Send("scripted send failure".to_string()));
                }
            }
            self.state.sent.lock().push(packet.clone());
            Ok(())
        }

        async fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            reconnect: ReconnectConfig {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 4,
                jitter_ms: 0,
            },
            audio: AudioProfile {
                sample_rate: 48000,
                channels: 2,
                bitrate: 96000,
            },
            connect_timeout_ms: 500,
            send_timeout_ms: 500,
            stop_flush_timeout_ms: 200,
            stats_interval_ms: 50,
            ..Default::default()
        }
    }

    fn test_session(config: SessionConfig) -> (LiveSession, Arc<MockState>) {
        let (transport, state) = MockTransport::new();
        let pipeline = Pipeline {
            video_encoder: Box::new(PassthroughVideoEncoder::default()),
            audio_encoder: Box::new(PcmAudioEncoder::new(AudioEncoderConfig {
                profile: config.audio.clone(),
            })),
            muxer: Box::new(FlvMuxer::new(FlvMuxerConfig {
                has_video: true,
                has_audio: true,
                audio_sample_rate: config.audio.sample_rate,
                audio_channels: config.audio.channels,
            })),
            transport: Box::new(transport),
        };
        let session = LiveSession::new(config, Arc::new(NullCaptureSource), pipeline);
        (session, state)
    }

    fn video_frame(ts: u64) -> VideoFrame {
        VideoFrame::from_slice(&[0x42; 32], Resolution::HD720, PixelFormat::Encoded, ts)
    }

    fn audio_frame(ts: u64) -> AudioFrame {
        let pcm: Vec<i16> = vec![1000; 960 * 2];
        AudioFrame::from_slice(bytemuck::cast_slice(&pcm), 48000, 2, ts)
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    async fn wait_for_state(session: &LiveSession, target: SessionState) {
        let mut watch = session.state_watch();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *watch.borrow() == target {
                    return;
                }
                watch.changed().await.expect("worker gone");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {target}"));
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_url() {
        let (session, _) = test_session(test_config());
        assert!(matches!(session.start(""), Err(LiveError::Config(_))));
        assert!(matches!(
            session.start("not a url"),
            Err(LiveError::Config(_))
        ));
        assert!(matches!(
            session.start("http://example.com/live"),
            Err(LiveError::Config(_))
        ));
        assert_eq!(session.state(), SessionState::Idle);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_push_while_idle_drops() {
        let (session, state) = test_session(test_config());
        session.push_frame(video_frame(0));
        session.push_frame(video_frame(33));
        let stats = session.stats();
        assert_eq!(stats.dropped_frames, 2);
        assert_eq!(stats.frames_pushed, 0);
        assert!(state.sent.lock().is_empty());
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_lifecycle_idle_pending_live_idle() {
        init_tracing();
        let (session, state) = test_session(test_config());
        let mut events = session.events().unwrap();

        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;
        assert!(session.is_live());

        session.push_frame(video_frame(0));
        wait_until(|| state.sent.lock().len() >= 2).await;

        {
            let sent = state.sent.lock();
            assert_eq!(sent[0].kind, PacketKind::Header);
            assert!(sent[1].is_key_frame());
            assert!(sent[1].segment_start);
        }

        session.stop();
        wait_for_state(&session, SessionState::Idle).await;

        let mut states = Vec::new();
        while let Some(event) = events.try_recv() {
            if let SessionEvent::StateChanged { state, .. } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![SessionState::Pending, SessionState::Live, SessionState::Idle]
        );
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (session, _) = test_session(test_config());
        let mut events = session.events().unwrap();

        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;

        session.stop();
        session.stop();
        wait_for_state(&session, SessionState::Idle).await;
        // Give a second stop a chance to (wrongly) re-emit
        tokio::time::sleep(Duration::from_millis(50)).await;

        let idle_transitions = std::iter::from_fn(|| events.try_recv())
            .filter(|e| {
                matches!(
                    e,
                    SessionEvent::StateChanged {
                        state: SessionState::Idle,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(idle_transitions, 1);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reaches_error() {
        let mut config = test_config();
        config.reconnect.max_attempts = 2;
        let (session, state) = test_session(config);
        state.open_script.lock().extend([false, false]);

        let mut events = session.events().unwrap();
        session.start("rtmp://unreachable/app").unwrap();
        wait_for_state(&session, SessionState::Error).await;

        let stats = session.stats();
        assert_eq!(stats.connect_faults, 2);
        assert_eq!(state.opens.load(Ordering::SeqCst), 2);

        let mut saw_retry_exhausted = false;
        while let Some(event) = events.try_recv() {
            if let SessionEvent::Error { kind, .. } = event {
                assert_eq!(kind, ErrorKind::RetryExhausted);
                saw_retry_exhausted = true;
            }
        }
        assert!(saw_retry_exhausted);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_after_send_fault() {
        init_tracing();
        let (session, state) = test_session(test_config());
        *state.fail_sends.lock() = 1;

        let mut events = session.events().unwrap();
        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;

        // First packet hits the scripted send failure and triggers a reconnect
        session.push_frame(video_frame(0));
        wait_until(|| state.opens.load(Ordering::SeqCst) >= 2).await;
        wait_for_state(&session, SessionState::Live).await;

        session.push_frame(video_frame(33));
        wait_until(|| state.sent.lock().iter().any(|p| p.is_video())).await;

        {
            let sent = state.sent.lock();
            // Fresh connection: header replayed, first video tag is a keyframe
            assert_eq!(sent[0].kind, PacketKind::Header);
            let first_video = sent.iter().find(|p| p.is_video()).unwrap();
            assert!(first_video.is_key_frame());
        }

        let states: Vec<SessionState> = std::iter::from_fn(|| events.try_recv())
            .filter_map(|e| match e {
                SessionEvent::StateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect();
        assert!(states.contains(&SessionState::Refreshing));
        assert_eq!(session.stats().send_faults, 1);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_buffered_frames_flush_in_order_after_connect() {
        let (session, state) = test_session(test_config());
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        *state.open_gate.lock() = Some(gate.clone());

        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Pending).await;

        // Buffer while still connecting
        session.push_frame(video_frame(10));
        session.push_frame(video_frame(20));
        session.push_frame(video_frame(30));
        assert!(state.sent.lock().is_empty());

        gate.add_permits(1);
        wait_for_state(&session, SessionState::Live).await;
        wait_until(|| state.sent.lock().iter().filter(|p| p.is_video()).count() >= 3).await;

        let timestamps: Vec<u64> = state
            .sent
            .lock()
            .iter()
            .filter(|p| p.is_video())
            .map(|p| p.timestamp_ms)
            .collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_mute_produces_silent_payloads() {
        let (session, state) = test_session(test_config());
        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;

        session.set_mute(true);
        // Commands outrank frames, but give the mute a moment to land
        tokio::time::sleep(Duration::from_millis(20)).await;

        session.push_audio(audio_frame(20));
        session.push_audio(audio_frame(40));
        wait_until(|| {
            state
                .sent
                .lock()
                .iter()
                .filter(|p| p.kind == PacketKind::Audio)
                .count()
                >= 2
        })
        .await;

        let sent = state.sent.lock();
        let audio_packets: Vec<&Packet> = sent
            .iter()
            .filter(|p| p.kind == PacketKind::Audio)
            .collect();
        // Cadence preserved: one sample unit per pushed frame
        assert_eq!(audio_packets.len(), 2);
        assert_eq!(audio_packets[0].timestamp_ms, 20);
        assert_eq!(audio_packets[1].timestamp_ms, 40);
        for packet in audio_packets {
            // FLV tag: 11-byte header, 1-byte audio header, payload, 4-byte size
            let payload = &packet.data[12..packet.data.len() - 4];
            assert!(payload.iter().all(|&b| b == 0), "muted payload not silent");
        }
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_output_timestamps_non_decreasing() {
        let (session, state) = test_session(test_config());
        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;

        session.push_frame(video_frame(0));
        session.push_audio(audio_frame(10));
        session.push_frame(video_frame(33));
        session.push_audio(audio_frame(40));
        session.push_frame(video_frame(66));

        wait_until(|| {
            state
                .sent
                .lock()
                .iter()
                .filter(|p| p.kind != PacketKind::Header)
                .count()
                >= 5
        })
        .await;

        let sent = state.sent.lock();
        let timestamps: Vec<u64> = sent
            .iter()
            .filter(|p| p.kind != PacketKind::Header)
            .map(|p| p.timestamp_ms)
            .collect();
        let mut sorted = timestamps.clone();
        sorted.sort_unstable();
        assert_eq!(timestamps, sorted);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_video_encoder_fault_aborts_session() {
        let (session, _) = test_session(test_config());
        let mut events = session.events().unwrap();
        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;

        // Empty payload makes the passthrough encoder fault
        session.push_frame(VideoFrame::from_slice(
            &[],
            Resolution::HD720,
            PixelFormat::Encoded,
            5,
        ));
        wait_for_state(&session, SessionState::Error).await;

        let mut saw_encoder_error = false;
        while let Some(event) = events.try_recv() {
            if let SessionEvent::Error { kind, .. } = event {
                assert_eq!(kind, ErrorKind::Encoder);
                saw_encoder_error = true;
            }
        }
        assert!(saw_encoder_error);
        assert_eq!(session.stats().encoder_faults, 1);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_audio_encoder_fault_degrades_to_video_only() {
        let (session, state) = test_session(test_config());
        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;

        // Mismatched sample rate faults the PCM encoder; policy is Degrade
        session.push_audio(AudioFrame::from_slice(&[0u8; 128], 8000, 1, 5));
        wait_until(|| session.stats().encoder_faults == 1).await;
        assert!(session.is_live());

        // Video keeps flowing
        session.push_frame(video_frame(100));
        wait_until(|| state.sent.lock().iter().any(|p| p.is_video())).await;

        // Further audio is discarded without new faults
        session.push_audio(audio_frame(200));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(session.stats().encoder_faults, 1);
        assert!(!state.sent.lock().iter().any(|p| p.kind == PacketKind::Audio));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_overflow_drops_oldest_and_counts() {
        let mut config = test_config();
        config.queue.video_capacity = 3;
        let (session, state) = test_session(config);
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        *state.open_gate.lock() = Some(gate.clone());

        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Pending).await;

        for ts in [1, 2, 3, 4] {
            session.push_frame(video_frame(ts));
        }
        let stats = session.stats();
        assert_eq!(stats.dropped_frames, 1);
        assert_eq!(stats.queue_depth, 3);

        gate.add_permits(1);
        wait_for_state(&session, SessionState::Live).await;
        wait_until(|| state.sent.lock().iter().filter(|p| p.is_video()).count() >= 3).await;

        let timestamps: Vec<u64> = state
            .sent
            .lock()
            .iter()
            .filter(|p| p.is_video())
            .map(|p| p.timestamp_ms)
            .collect();
        assert_eq!(timestamps, vec![2, 3, 4]);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_statistics_events_emitted_while_live() {
        let (session, _) = test_session(test_config());
        let mut events = session.events().unwrap();
        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;

        session.push_frame(video_frame(0));

        let report = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Some(SessionEvent::Statistics(report)) if report.packets_sent >= 1 => {
                        return report;
                    }
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("no statistics event");
        assert!(report.packets_sent >= 1);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_while_live_is_rejected() {
        let (session, _) = test_session(test_config());
        session.start("rtmp://host/app/key").unwrap();
        wait_for_state(&session, SessionState::Live).await;
        assert!(matches!(
            session.start("rtmp://other/app"),
            Err(LiveError::Config(_))
        ));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_after_error() {
        let mut config = test_config();
        config.reconnect.max_attempts = 1;
        let (session, state) = test_session(config);
        state.open_script.lock().push_back(false);

        session.start("rtmp://host/app").unwrap();
        wait_for_state(&session, SessionState::Error).await;

        // Error is terminal until an explicit new start
        session.start("rtmp://host/app").unwrap();
        wait_for_state(&session, SessionState::Live).await;
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_configure_device_reaches_source_without_state_change() {
        use std::sync::atomic::AtomicBool;

        struct FlagSource {
            camera: AtomicBool,
            microphone: AtomicBool,
        }
        impl CaptureSource for FlagSource {
            fn set_device_running(&self, camera: bool, microphone: bool) {
                self.camera.store(camera, Ordering::SeqCst);
                self.microphone.store(microphone, Ordering::SeqCst);
            }
        }

        let source = Arc::new(FlagSource {
            camera: AtomicBool::new(true),
            microphone: AtomicBool::new(true),
        });
        let (transport, _) = MockTransport::new();
        let config = test_config();
        let pipeline = Pipeline {
            video_encoder: Box::new(PassthroughVideoEncoder::default()),
            audio_encoder: Box::new(PcmAudioEncoder::new(AudioEncoderConfig {
                profile: config.audio.clone(),
            })),
            muxer: Box::new(FlvMuxer::default()),
            transport: Box::new(transport),
        };
        let session = LiveSession::new(config, source.clone(), pipeline);

        session.configure_device(false, true);
        wait_until(|| !source.camera.load(Ordering::SeqCst)).await;
        assert!(source.microphone.load(Ordering::SeqCst));
        assert_eq!(session.state(), SessionState::Idle);
        session.shutdown().await;
    }
}
