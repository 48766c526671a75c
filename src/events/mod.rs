//! Session event delivery
//!
//! Events are emitted by the session worker only, onto a single-consumer
//! channel, so the listener sees them in pipeline order and never
//! concurrently. The channel is the weak-observer seam: the session never
//! owns the listener, and a dropped receiver silently turns publishing
//! into a no-op.

pub mod types;

pub use types::{ErrorKind, SessionEvent, StatsReport};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Single-consumer event channel between the session worker and a listener
pub struct EventChannel {
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: Mutex<Option<EventReceiver>>,
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(EventReceiver { rx })),
        }
    }

    /// Publish an event
    ///
    /// If no listener has subscribed, or the listener dropped its receiver,
    /// the event is discarded; events are fire-and-forget notifications.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Take the receiver half
    ///
    /// At most one listener: the first call returns the receiver, later
    /// calls return `None`.
    pub fn subscribe(&self) -> Option<EventReceiver> {
        self.rx.lock().take()
    }

    /// Whether a listener can still receive events
    pub fn has_listener(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of the event channel
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventReceiver {
    /// Receive the next event, `None` once the session is gone
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}
