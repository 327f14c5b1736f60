//! Receiver side of the frame protocol
//!
//! Accepts device connections, reassembles length-prefixed JPEG messages and
//! optionally stores each one as `frame_NNNNNN.jpg`. Used as a development
//! server for the `camera-streamer` binary.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::wire;

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Directory for received frames; frames are only logged when unset
    pub output_dir: Option<PathBuf>,

    /// Text line sent to each device once it connects
    pub greeting: Option<String>,

    pub max_frame_len: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            greeting: None,
            max_frame_len: wire::DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Per-connection totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub frames: u64,
    pub bytes: u64,
}

pub struct FrameSink {
    config: SinkConfig,

    /// Numbering for stored frames, shared by all connections
    next_index: AtomicU64,
}

impl FrameSink {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            next_index: AtomicU64::new(0),
        }
    }

    /// Reads frames until the device closes the stream.
    ///
    /// A clean close between messages ends the connection with its totals; a
    /// close inside a message or an oversized length prefix is an error.
    pub async fn handle_connection<S>(&self, mut stream: S, peer: &str) -> Result<SinkReport, TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(peer, "Device connected");

        if let Some(greeting) = &self.config.greeting {
            stream.write_all(greeting.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            stream.flush().await?;
            debug!(peer, greeting = %greeting, "Greeting sent");
        }

        let mut report = SinkReport::default();
        while let Some(frame) = wire::read_frame(&mut stream, self.config.max_frame_len).await? {
            report.frames += 1;
            report.bytes += frame.len() as u64;

            if !frame.starts_with(&JPEG_SOI) {
                warn!(peer, len = frame.len(), "Frame does not start with a JPEG marker");
            }
            debug!(peer, frame = report.frames, len = frame.len(), "Frame received");

            if let Some(dir) = &self.config.output_dir {
                let index = self.next_index.fetch_add(1, Ordering::Relaxed);
                let path = dir.join(format!("frame_{:06}.jpg", index));
                if let Err(e) = tokio::fs::write(&path, &frame).await {
                    warn!(path = %path.display(), error = %e, "Failed to store frame");
                }
            }

            if report.frames % 100 == 0 {
                info!(peer, frames = report.frames, bytes = report.bytes, "Receiving");
            }
        }

        info!(peer, frames = report.frames, bytes = report.bytes, "Device disconnected");
        Ok(report)
    }

    /// Accepts connections forever, one task per device
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "Frame sink listening");
        loop {
            let (stream, addr) = listener.accept().await?;
            let sink = Arc::clone(&self);
            tokio::spawn(async move {
                let peer = addr.to_string();
                if let Err(e) = sink.handle_connection(stream, &peer).await {
                    warn!(peer = %peer, error = %e, "Connection ended with error");
                }
            });
        }
    }
}
