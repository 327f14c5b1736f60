//! Error types shared by drivers, transport and tasks

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a hardware or OS collaborator
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Failure on the stream connection or in the wire framing
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("payload of {0} bytes does not fit the 4-byte length field")]
    PayloadTooLarge(usize),

    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("connection not available")]
    NotConnected,
}

impl TransportError {
    /// True when the error means the remote side has gone away
    pub fn is_peer_closed(&self) -> bool {
        match self {
            TransportError::PeerClosed => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Bring-up failure of one of the three initialization tasks
#[derive(Error, Debug)]
pub enum BringUpError {
    #[error("wifi: {0}")]
    Wifi(#[source] DriverError),

    #[error("camera: {0}")]
    Camera(#[source] DriverError),

    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("connect to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },
}

/// How a task ended, as seen at the task boundary
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("bring-up failed: {0}")]
    BringUp(#[from] BringUpError),

    #[error("capture failed: {0}")]
    Capture(#[source] DriverError),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Whether this failure must take the whole pipeline down.
    ///
    /// Bring-up failures only stall the readiness gate.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TaskError::BringUp(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_closed_detection() {
        assert!(TransportError::PeerClosed.is_peer_closed());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_peer_closed());
        assert!(
            TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_peer_closed()
        );
        assert!(!TransportError::Io(io::Error::from(io::ErrorKind::Interrupted)).is_peer_closed());
        assert!(!TransportError::NotConnected.is_peer_closed());
    }

    #[test]
    fn test_fatality() {
        let bring_up = TaskError::BringUp(BringUpError::Wifi(DriverError::Unavailable(
            "radio off".to_string(),
        )));
        assert!(!bring_up.is_fatal());

        assert!(TaskError::Transport(TransportError::PeerClosed).is_fatal());
        assert!(TaskError::Capture(DriverError::Unavailable("gone".to_string())).is_fatal());
        assert!(TaskError::Panicked("boom".to_string()).is_fatal());
    }
}
