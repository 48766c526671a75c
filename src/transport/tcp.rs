//! TCP transport
//!
//! Pushes length-prefix-framed mux packets over a persistent TCP
//! connection to the ingest endpoint.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};
use url::Url;

use super::framing::encode_frame_into;
use super::Transport;
use crate::error::{LiveError, Result};
use crate::mux::Packet;

/// Default ingest port for rtmp:// URLs
const DEFAULT_RTMP_PORT: u16 = 1935;

/// TCP transport to an ingest endpoint
pub struct TcpTransport {
    stream: Option<TcpStream>,
    /// Reusable write buffer to avoid per-packet allocation
    write_buf: BytesMut,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            stream: None,
            write_buf: BytesMut::with_capacity(16 * 1024),
        }
    }

    /// Resolve host:port from the target URL
    fn endpoint(url: &Url) -> Result<(String, u16)> {
        let host = url
            .host_str()
            .ok_or_else(|| LiveError::Connect(format!("URL has no host: {url}")))?;
        let port = url.port().unwrap_or(DEFAULT_RTMP_PORT);
        Ok((host.to_string(), port))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self, url: &Url) -> Result<()> {
        if self.stream.is_some() {
            self.close().await;
        }

        let (host, port) = Self::endpoint(url)?;
        debug!("Connecting to {}:{}", host, port);

        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| LiveError::Connect(format!("{host}:{port}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| LiveError::Connect(format!("set_nodelay: {e}")))?;

        info!("Connected to ingest endpoint {}:{}", host, port);
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, packet: &Packet) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LiveError::Send("transport not open".to_string()))?;

        self.write_buf.clear();
        encode_frame_into(&packet.data, &mut self.write_buf)
            .map_err(|e| LiveError::Send(e.to_string()))?;

        stream
            .write_all(&self.write_buf)
            .await
            .map_err(|e| LiveError::Send(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| LiveError::Send(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Transport closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
