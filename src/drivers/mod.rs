//! Hardware and OS collaborators
//!
//! The pipeline never talks to a radio, sensor, display or socket directly.
//! Each collaborator sits behind a trait so the bring-up and streaming logic can
//! run against real Linux drivers on the board and against mocks in tests.
//!
//! Driver calls block; tasks run them on the blocking pool.

mod display;
mod encoder;
mod transport;
mod wifi;

#[cfg(target_os = "linux")]
mod camera;

pub use display::HeadlessMedia;
pub use encoder::ImageJpegEncoder;
pub use transport::TcpConnector;
pub use wifi::NmcliWifi;

#[cfg(target_os = "linux")]
pub use camera::{default_device_path, V4lCamera};

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::DriverError;

/// Capture channel of a multi-channel sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chn{}", self.0)
    }
}

/// Frame resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    /// Packed 24-bit RGB, 3 bytes per pixel
    Rgb888,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb888 => 3,
        }
    }
}

/// One captured image; lives for a single capture iteration
#[derive(Debug, Clone)]
pub struct Frame {
    pub channel: ChannelId,
    pub format: PixelFormat,
    pub size: FrameSize,
    pub sequence: u64,
    pub data: Bytes,
}

impl Frame {
    /// Byte length a well-formed frame of this size and format must have
    pub fn expected_len(&self) -> usize {
        self.size.width as usize * self.size.height as usize * self.format.bytes_per_pixel()
    }
}

/// Access point credentials handed to the WiFi driver
#[derive(Clone)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

impl fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Station-mode WiFi radio
pub trait WifiDriver: Send + Sync {
    fn is_active(&self) -> Result<bool, DriverError>;

    fn set_active(&self, active: bool) -> Result<(), DriverError>;

    /// Starts association; must not wait for the link to come up
    fn connect(&self, credentials: &WifiCredentials) -> Result<(), DriverError>;

    fn is_connected(&self) -> Result<bool, DriverError>;

    /// Address assigned to the station, once connected
    fn address(&self) -> Result<Option<IpAddr>, DriverError>;
}

/// Image sensor with per-channel output configuration
pub trait CameraSensor: Send + Sync {
    fn reset(&self) -> Result<(), DriverError>;

    fn set_frame_size(&self, channel: ChannelId, size: FrameSize) -> Result<(), DriverError>;

    fn set_pixel_format(&self, channel: ChannelId, format: PixelFormat)
        -> Result<(), DriverError>;

    /// Starts the sensor's frame pump
    fn start(&self) -> Result<(), DriverError>;

    fn stop(&self) -> Result<(), DriverError>;

    /// Grabs the next frame; `Ok(None)` when the sensor produced nothing
    fn snapshot(&self, channel: ChannelId) -> Result<Option<Frame>, DriverError>;
}

/// Lossy JPEG encoder
pub trait FrameEncoder: Send + Sync {
    fn encode_jpeg(&self, frame: &Frame, quality: u8) -> Result<Bytes, DriverError>;
}

/// Display and media buffer subsystem the sensor output is routed through
pub trait MediaBackend: Send + Sync {
    fn init_display(&self, size: FrameSize) -> Result<(), DriverError>;

    fn init_media(&self) -> Result<(), DriverError>;
}

/// Bidirectional byte stream to the server
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// Opens stream connections to `host:port` endpoints
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, endpoint: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>>;
}

/// Every collaborator the pipeline needs
#[derive(Clone)]
pub struct Drivers {
    pub wifi: Arc<dyn WifiDriver>,
    pub camera: Arc<dyn CameraSensor>,
    pub encoder: Arc<dyn FrameEncoder>,
    pub media: Arc<dyn MediaBackend>,
    pub connector: Arc<dyn Connector>,
}
