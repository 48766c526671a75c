//! Transport: ownership of the network connection to the ingest endpoint
//!
//! The session only talks to the [`Transport`] trait, so the wire protocol
//! can be swapped without touching session logic. Transport-level failures
//! are non-fatal: they feed the session's reconnect policy instead of
//! propagating to the caller.

pub mod framing;
pub mod tcp;

use async_trait::async_trait;
use url::Url;

use crate::error::Result;
use crate::mux::Packet;

pub use tcp::TcpTransport;

/// Transport over a persistent connection
///
/// `open` fails with [`LiveError::Connect`](crate::LiveError::Connect),
/// `send` with [`LiveError::Send`](crate::LiveError::Send). Only the session
/// worker calls these; both may await network I/O.
#[async_trait]
pub trait Transport: Send {
    /// Open a connection to the ingest endpoint
    async fn open(&mut self, url: &Url) -> Result<()>;

    /// Send a muxed packet
    async fn send(&mut self, packet: &Packet) -> Result<()>;

    /// Close the connection (idempotent)
    async fn close(&mut self);

    /// Whether a connection is currently open
    fn is_open(&self) -> bool;
}
