//! Capture source seam
//!
//! The engine never touches platform camera/microphone APIs. A
//! [`CaptureSource`] is the external adapter that produces raw media and
//! feeds it in through `LiveSession::push_frame` / `push_audio`; the
//! session only calls back to tell it which devices should be running.

/// External capture adapter
pub trait CaptureSource: Send + Sync {
    /// Device solicitation changed via `configure_device`
    ///
    /// `camera`/`microphone` say whether raw video/audio should be produced.
    /// This gates solicitation only: frames pushed while a device is
    /// disabled still flow through the pipeline.
    fn set_device_running(&self, camera: bool, microphone: bool);
}

/// Capture source that ignores solicitation changes
///
/// For callers that drive `push_frame`/`push_audio` themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCaptureSource;

impl CaptureSource for NullCaptureSource {
    fn set_device_running(&self, _camera: bool, _microphone: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct RecordingSource {
        camera: AtomicBool,
        microphone: AtomicBool,
    }

    impl CaptureSource for RecordingSource {
        fn set_device_running(&self, camera: bool, microphone: bool) {
            self.camera.store(camera, Ordering::SeqCst);
            self.microphone.store(microphone, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_source_notification() {
        let source = Arc::new(RecordingSource {
            camera: AtomicBool::new(false),
            microphone: AtomicBool::new(false),
        });
        let dyn_source: Arc<dyn CaptureSource> = source.clone();
        dyn_source.set_device_running(true, false);
        assert!(source.camera.load(Ordering::SeqCst));
        assert!(!source.microphone.load(Ordering::SeqCst));
    }
}
