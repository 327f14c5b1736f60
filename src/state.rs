//! Shared readiness state and the server connection handle
//!
//! All cross-task coordination goes through one `ReadinessState`: four flags
//! and the optional connection, behind a single lock that is only held for the
//! read or write itself, never across an await.

use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::debug;

use crate::drivers::BoxedStream;
use crate::error::TransportError;
use crate::wire;

/// Flags readable through [`ReadinessState::get`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Wifi,
    Camera,
    Tcp,
    Running,
}

/// Bring-up stages published through [`ReadinessState::set`].
///
/// `Tcp` is only ever set together with its connection, and `Running` only
/// ever goes false, so neither can be set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Wifi,
    Camera,
}

/// Point-in-time copy of the flags, for logging and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReadinessSnapshot {
    pub wifi: bool,
    pub camera: bool,
    pub tcp: bool,
    pub running: bool,
}

impl ReadinessSnapshot {
    pub fn all_ready(&self) -> bool {
        self.wifi && self.camera && self.tcp
    }
}

struct Inner {
    flags: ReadinessSnapshot,
    connection: Option<Arc<Connection>>,
}

impl Inner {
    fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::Wifi => self.flags.wifi,
            Flag::Camera => self.flags.camera,
            Flag::Tcp => self.flags.tcp,
            Flag::Running => self.flags.running,
        }
    }
}

/// Readiness flags plus the live connection, guarded by one lock
pub struct ReadinessState {
    inner: Mutex<Inner>,
    changed: Notify,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                flags: ReadinessSnapshot {
                    running: true,
                    ..Default::default()
                },
                connection: None,
            }),
            changed: Notify::new(),
        }
    }

    pub fn get(&self, flag: Flag) -> bool {
        self.inner.lock().get(flag)
    }

    pub fn set(&self, stage: Stage) {
        {
            let mut inner = self.inner.lock();
            match stage {
                Stage::Wifi => inner.flags.wifi = true,
                Stage::Camera => inner.flags.camera = true,
            }
        }
        self.changed.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.get(Flag::Running)
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        self.inner.lock().flags
    }

    /// Publishes the handle and sets `tcp` in one step.
    ///
    /// After shutdown the connection is handed back so the caller can drop it.
    pub fn publish_connection(&self, connection: Connection) -> Result<(), Connection> {
        {
            let mut inner = self.inner.lock();
            if !inner.flags.running {
                return Err(connection);
            }
            inner.connection = Some(Arc::new(connection));
            inner.flags.tcp = true;
        }
        self.changed.notify_waiters();
        Ok(())
    }

    /// Borrows the published connection for one operation
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.inner.lock().connection.clone()
    }

    /// Removes the connection and clears `tcp`; only the first caller gets it
    pub fn take_connection(&self) -> Option<Arc<Connection>> {
        let taken = {
            let mut inner = self.inner.lock();
            inner.flags.tcp = false;
            inner.connection.take()
        };
        self.changed.notify_waiters();
        taken
    }

    /// Clears `running`. Idempotent; returns true for the call that flipped it.
    pub fn request_shutdown(&self) -> bool {
        let flipped = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.flags.running, false)
        };
        if flipped {
            debug!("Shutdown requested");
        }
        self.changed.notify_waiters();
        flipped
    }

    /// Polls until every flag in `flags` is set or shutdown is requested.
    ///
    /// Returns false on shutdown. Wakes early on any state change.
    pub async fn wait_for(&self, flags: &[Flag], interval: Duration) -> bool {
        loop {
            // Registered before the check so a change in between is not missed
            let changed = self.changed.notified();
            {
                let inner = self.inner.lock();
                if !inner.flags.running {
                    return false;
                }
                if flags.iter().all(|flag| inner.get(*flag)) {
                    return true;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = changed => {}
            }
        }
    }

    /// Sleeps for `interval`, cut short by any state change
    pub async fn pause(&self, interval: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = self.changed.notified() => {}
        }
    }

    /// Resolves once shutdown has been requested
    pub async fn shutdown_requested(&self, interval: Duration) {
        loop {
            let changed = self.changed.notified();
            if !self.is_running() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = changed => {}
            }
        }
    }
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

/// Open stream to the server, split into a write half for the send loop and
/// a read half for the receive loop
pub struct Connection {
    peer: String,
    reader: AsyncMutex<ReadHalf<BoxedStream>>,
    writer: AsyncMutex<WriteHalf<BoxedStream>>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(peer: impl Into<String>, stream: BoxedStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            peer: peer.into(),
            reader: AsyncMutex::new(reader),
            writer: AsyncMutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes one length-prefixed frame, consuming the payload
    pub async fn send_frame(&self, payload: Bytes) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::NotConnected);
        }
        let mut writer = self.writer.lock().await;
        wire::write_frame(&mut *writer, &payload).await
    }

    /// Reads whatever is already buffered without waiting.
    ///
    /// `Ok(None)` means nothing was available; a zero-length read is reported
    /// as [`TransportError::PeerClosed`].
    pub async fn try_receive(&self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::NotConnected);
        }
        let mut reader = self.reader.lock().await;
        match reader.read(buf).now_or_never() {
            None => Ok(None),
            Some(Ok(0)) if !buf.is_empty() => Err(TransportError::PeerClosed),
            Some(Ok(n)) => Ok(Some(n)),
            Some(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Some(Err(e)) => Err(e.into()),
        }
    }

    /// Shuts the write side down. Only the first call touches the stream.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
