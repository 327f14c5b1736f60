//! Mock collaborators shared by the integration tests
#![allow(dead_code)]

use bytes::Bytes;
use camera_tcp_streamer::config::TimingConfig;
use camera_tcp_streamer::drivers::{
    BoxedStream, CameraSensor, ChannelId, Connector, Drivers, Frame, FrameEncoder, FrameSize,
    HeadlessMedia, PixelFormat, WifiCredentials, WifiDriver,
};
use camera_tcp_streamer::{DriverError, StreamConfig};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, oneshot};

pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Config with millisecond intervals and a tiny frame
pub fn fast_config() -> StreamConfig {
    let mut config = StreamConfig::default();
    config.camera.width = 8;
    config.camera.height = 8;
    config.timing = TimingConfig {
        link_poll: Duration::from_millis(5),
        readiness_poll: Duration::from_millis(5),
        dependency_poll: Duration::from_millis(5),
        frame_interval: Duration::from_millis(5),
        receive_interval: Duration::from_millis(5),
        idle_poll: Duration::from_millis(10),
        grace_period: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(1),
    };
    config
}

/// Manual interrupt for `Pipeline::run`
pub fn interrupt() -> (oneshot::Sender<()>, impl Future<Output = ()> + Send + 'static) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

// ---------------------------------------------------------------------------
// WiFi

pub struct MockWifi {
    associates: bool,
    active: AtomicBool,
    pub connects: AtomicUsize,
    pub polls: AtomicUsize,
}

impl MockWifi {
    pub fn associating() -> Self {
        Self::new(true)
    }

    pub fn never_associating() -> Self {
        Self::new(false)
    }

    fn new(associates: bool) -> Self {
        Self {
            associates,
            active: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        }
    }
}

impl WifiDriver for MockWifi {
    fn is_active(&self) -> Result<bool, DriverError> {
        Ok(self.active.load(Ordering::SeqCst))
    }

    fn set_active(&self, active: bool) -> Result<(), DriverError> {
        self.active.store(active, Ordering::SeqCst);
        Ok(())
    }

    fn connect(&self, credentials: &WifiCredentials) -> Result<(), DriverError> {
        assert_eq!(credentials.ssid, "Web");
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> Result<bool, DriverError> {
        // Link comes up on the third poll
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self.associates && polls >= 3)
    }

    fn address(&self) -> Result<Option<IpAddr>, DriverError> {
        Ok(Some(IpAddr::V4(Ipv4Addr::new(192, 168, 43, 20))))
    }
}

// ---------------------------------------------------------------------------
// Camera

/// Snapshot and stop share one sensor lock, like a real single-stream driver
pub struct MockCamera {
    sensor: Mutex<()>,
    started: AtomicBool,
    fail_start: bool,
    fail_snapshots: AtomicBool,
    stall: Option<(u64, Duration)>,
    pub snapshots: AtomicU64,
    pub stops: AtomicUsize,
}

impl MockCamera {
    pub fn new() -> Self {
        Self {
            sensor: Mutex::new(()),
            started: AtomicBool::new(false),
            fail_start: false,
            fail_snapshots: AtomicBool::new(false),
            stall: None,
            snapshots: AtomicU64::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    /// Sensor that opens but never starts its frame pump
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    /// Snapshot number `at` blocks inside the sensor lock for `stall`
    pub fn stalling_at(at: u64, stall: Duration) -> Self {
        Self {
            stall: Some((at, stall)),
            ..Self::new()
        }
    }

    pub fn fail_snapshots(&self) {
        self.fail_snapshots.store(true, Ordering::SeqCst);
    }
}

impl CameraSensor for MockCamera {
    fn reset(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn set_frame_size(&self, _channel: ChannelId, _size: FrameSize) -> Result<(), DriverError> {
        Ok(())
    }

    fn set_pixel_format(&self, _channel: ChannelId, _format: PixelFormat) -> Result<(), DriverError> {
        Ok(())
    }

    fn start(&self) -> Result<(), DriverError> {
        if self.fail_start {
            return Err(DriverError::Unavailable("no frame pump".to_string()));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        let _sensor = self.sensor.lock();
        self.started.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn snapshot(&self, channel: ChannelId) -> Result<Option<Frame>, DriverError> {
        let _sensor = self.sensor.lock();
        if !self.started.load(Ordering::SeqCst) {
            return Err(DriverError::Unavailable("snapshot before start".to_string()));
        }
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(DriverError::Unavailable("sensor unplugged".to_string()));
        }

        let sequence = self.snapshots.fetch_add(1, Ordering::SeqCst);
        if let Some((at, stall)) = self.stall {
            if sequence == at {
                std::thread::sleep(stall);
            }
        }
        let size = FrameSize { width: 8, height: 8 };
        Ok(Some(Frame {
            channel,
            format: PixelFormat::Rgb888,
            size,
            sequence,
            data: Bytes::from(vec![sequence as u8; 8 * 8 * 3]),
        }))
    }
}

// ---------------------------------------------------------------------------
// Encoder

/// Payload: SOI, sequence (u64 BE), sequence-dependent filler, EOI
pub struct MockEncoder {
    fail_every: Option<u64>,
    pub encoded: AtomicU64,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self {
            fail_every: None,
            encoded: AtomicU64::new(0),
        }
    }

    /// Fails every frame whose sequence is a multiple of `n`
    pub fn failing_every(n: u64) -> Self {
        Self {
            fail_every: Some(n),
            encoded: AtomicU64::new(0),
        }
    }
}

pub fn payload_len(sequence: u64) -> usize {
    2 + 8 + (sequence % 5) as usize * 10 + 2
}

pub fn sequence_of(payload: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&payload[2..10]);
    u64::from_be_bytes(raw)
}

impl FrameEncoder for MockEncoder {
    fn encode_jpeg(&self, frame: &Frame, quality: u8) -> Result<Bytes, DriverError> {
        assert_eq!(quality, 50);
        if let Some(n) = self.fail_every {
            if frame.sequence % n == 0 {
                return Err(DriverError::Encode(format!("frame {} rejected", frame.sequence)));
            }
        }

        self.encoded.fetch_add(1, Ordering::SeqCst);
        let mut out = JPEG_SOI.to_vec();
        out.extend_from_slice(&frame.sequence.to_be_bytes());
        out.resize(out.len() + (frame.sequence % 5) as usize * 10, 0x55);
        out.extend_from_slice(&JPEG_EOI);
        Ok(Bytes::from(out))
    }
}

// ---------------------------------------------------------------------------
// Transport

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    Accept,
    Refuse,
    Hang,
}

/// Hands out in-memory streams; the server ends arrive on `servers`
pub struct MockConnector {
    mode: ConnectMode,
    servers: mpsc::UnboundedSender<DuplexStream>,
    pub connects: AtomicUsize,
    pub fail_writes: Arc<AtomicBool>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(mode: ConnectMode) -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            mode,
            servers: tx,
            connects: AtomicUsize::new(0),
            fail_writes: Arc::new(AtomicBool::new(false)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
        };
        (connector, rx)
    }
}

impl Connector for MockConnector {
    fn connect<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            assert_eq!(endpoint, "192.168.43.88:80");
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                ConnectMode::Refuse => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
                ConnectMode::Hang => std::future::pending().await,
                ConnectMode::Accept => {
                    let (device, server) = tokio::io::duplex(64 * 1024);
                    let _ = self.servers.send(server);
                    let stream = TrackedStream {
                        inner: device,
                        fail_writes: Arc::clone(&self.fail_writes),
                        shutdowns: Arc::clone(&self.shutdowns),
                    };
                    Ok(Box::new(stream) as BoxedStream)
                }
            }
        })
    }
}

/// Duplex stream that counts shutdowns and can be told to fail writes
pub struct TrackedStream {
    inner: DuplexStream,
    fail_writes: Arc<AtomicBool>,
    shutdowns: Arc<AtomicUsize>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

// ---------------------------------------------------------------------------

/// Mocks plus handles the tests inspect
pub struct Harness {
    pub wifi: Arc<MockWifi>,
    pub camera: Arc<MockCamera>,
    pub encoder: Arc<MockEncoder>,
    pub connector: Arc<MockConnector>,
    pub servers: mpsc::UnboundedReceiver<DuplexStream>,
}

impl Harness {
    pub fn new(wifi: MockWifi, encoder: MockEncoder, mode: ConnectMode) -> Self {
        Self::with_camera(wifi, MockCamera::new(), encoder, mode)
    }

    pub fn with_camera(
        wifi: MockWifi,
        camera: MockCamera,
        encoder: MockEncoder,
        mode: ConnectMode,
    ) -> Self {
        let (connector, servers) = MockConnector::new(mode);
        Self {
            wifi: Arc::new(wifi),
            camera: Arc::new(camera),
            encoder: Arc::new(encoder),
            connector: Arc::new(connector),
            servers,
        }
    }

    pub fn healthy() -> Self {
        Self::new(MockWifi::associating(), MockEncoder::new(), ConnectMode::Accept)
    }

    pub fn drivers(&self) -> Drivers {
        Drivers {
            wifi: self.wifi.clone(),
            camera: self.camera.clone(),
            encoder: self.encoder.clone(),
            media: Arc::new(HeadlessMedia::new()),
            connector: self.connector.clone(),
        }
    }

    /// Server end of the first accepted connection
    pub async fn accept(&mut self) -> DuplexStream {
        tokio::time::timeout(Duration::from_secs(5), self.servers.recv())
            .await
            .expect("device never connected")
            .expect("connector dropped")
    }
}
