//! livepush - Real-time A/V live-push session engine
//!
//! This crate provides the capture -> encode -> mux -> transport pipeline
//! behind a live-streaming facade: a [`session::LiveSession`] drives
//! pluggable encoders, an FLV muxer and a swappable transport on a
//! dedicated worker task, with bounded buffering, reconnect-with-backoff
//! and ordered event delivery to a single listener.

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod mux;
pub mod session;
pub mod transport;
pub mod video;

pub use error::{LiveError, MediaKind, Result};
pub use session::{LiveSession, Pipeline, SessionState};
