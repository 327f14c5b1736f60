//! Fixed streaming configuration
//!
//! The device has no configuration file and no flags: every value is a
//! constant compiled into the binary. `StreamConfig` groups those constants so
//! tests can shorten intervals and point the pipeline at mock collaborators.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::drivers::{ChannelId, FrameSize, PixelFormat};

pub const WIFI_SSID: &str = "Web";
pub const WIFI_PASSWORD: &str = "88888888";
pub const WIFI_INTERFACE: &str = "wlan0";

pub const SERVER_HOST: &str = "192.168.43.88";
pub const SERVER_PORT: u16 = 80;

pub const SENSOR_ID: u32 = 2;
pub const CAPTURE_CHANNEL: ChannelId = ChannelId(0);
pub const FRAME_WIDTH: u32 = 640;
pub const FRAME_HEIGHT: u32 = 480;
pub const PIXEL_FORMAT: PixelFormat = PixelFormat::Rgb888;
pub const JPEG_QUALITY: u8 = 50;

pub const RECEIVE_BUFFER_SIZE: usize = 1024;

pub const LINK_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEPENDENCY_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const FRAME_INTERVAL: Duration = Duration::from_millis(100);
pub const RECEIVE_INTERVAL: Duration = Duration::from_millis(100);
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const GRACE_PERIOD: Duration = Duration::from_secs(1);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Complete device configuration
#[derive(Debug, Clone, Serialize)]
pub struct StreamConfig {
    /// Bound on a single non-blocking read of inbound server data
    pub receive_buffer_size: usize,

    pub wifi: WifiConfig,
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub timing: TimingConfig,
}

/// Access point credentials
#[derive(Debug, Clone, Serialize)]
pub struct WifiConfig {
    pub ssid: String,

    /// Never rendered into logs
    #[serde(skip_serializing)]
    pub password: String,

    /// Network interface handed to the WiFi driver
    pub interface: String,
}

/// Fixed TCP endpoint of the frame server
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` form used for connecting and logging
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Sensor and encoder settings
#[derive(Debug, Clone, Serialize)]
pub struct CameraConfig {
    /// Sensor index; on V4L2 boards this selects `/dev/video<id>`
    pub sensor_id: u32,
    pub channel: ChannelId,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl CameraConfig {
    pub fn frame_size(&self) -> FrameSize {
        FrameSize {
            width: self.width,
            height: self.height,
        }
    }
}

/// Poll intervals and timeouts
#[derive(Debug, Clone, Serialize)]
pub struct TimingConfig {
    /// WiFi link-state polling
    #[serde(with = "millis")]
    pub link_poll: Duration,

    /// Orchestrator readiness gate
    #[serde(with = "millis")]
    pub readiness_poll: Duration,

    /// Tasks waiting on another task's readiness flag
    #[serde(with = "millis")]
    pub dependency_poll: Duration,

    /// Pacing of the capture/encode/send loop
    #[serde(with = "millis")]
    pub frame_interval: Duration,

    /// Pacing of the receive loop
    #[serde(with = "millis")]
    pub receive_interval: Duration,

    /// Orchestrator idle poll while streaming
    #[serde(with = "millis")]
    pub idle_poll: Duration,

    /// Time tasks get to exit after shutdown before the connection is closed
    #[serde(with = "millis")]
    pub grace_period: Duration,

    #[serde(with = "millis")]
    pub connect_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            link_poll: LINK_POLL_INTERVAL,
            readiness_poll: READINESS_POLL_INTERVAL,
            dependency_poll: DEPENDENCY_POLL_INTERVAL,
            frame_interval: FRAME_INTERVAL,
            receive_interval: RECEIVE_INTERVAL,
            idle_poll: IDLE_POLL_INTERVAL,
            grace_period: GRACE_PERIOD,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: RECEIVE_BUFFER_SIZE,
            wifi: WifiConfig {
                ssid: WIFI_SSID.to_string(),
                password: WIFI_PASSWORD.to_string(),
                interface: WIFI_INTERFACE.to_string(),
            },
            server: ServerConfig {
                host: SERVER_HOST.to_string(),
                port: SERVER_PORT,
            },
            camera: CameraConfig {
                sensor_id: SENSOR_ID,
                channel: CAPTURE_CHANNEL,
                width: FRAME_WIDTH,
                height: FRAME_HEIGHT,
                pixel_format: PIXEL_FORMAT,
                jpeg_quality: JPEG_QUALITY,
            },
            timing: TimingConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi.ssid.is_empty() {
            return Err(ConfigError::Invalid("wifi ssid must not be empty".to_string()));
        }

        if self.server.host.is_empty() || self.server.port == 0 {
            return Err(ConfigError::Invalid(format!(
                "server endpoint {} is not usable",
                self.server.endpoint()
            )));
        }

        let cam = &self.camera;
        if cam.width == 0 || cam.height == 0 {
            return Err(ConfigError::Invalid(
                "camera width and height must be > 0".to_string(),
            ));
        }

        // YUYV delivers pixel pairs
        if cam.width % 2 != 0 || cam.height % 2 != 0 {
            return Err(ConfigError::Invalid(
                "camera width and height must be even".to_string(),
            ));
        }

        if cam.jpeg_quality == 0 || cam.jpeg_quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "JPEG quality must be between 1 and 100, got {}",
                cam.jpeg_quality
            )));
        }

        if self.receive_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "receive buffer size must be > 0".to_string(),
            ));
        }

        let t = &self.timing;
        let intervals = [
            ("link_poll", t.link_poll),
            ("readiness_poll", t.readiness_poll),
            ("dependency_poll", t.dependency_poll),
            ("frame_interval", t.frame_interval),
            ("receive_interval", t.receive_interval),
            ("idle_poll", t.idle_poll),
            ("connect_timeout", t.connect_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }

        Ok(())
    }

    /// Renders the effective configuration, without the WiFi passphrase
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.server.endpoint(), "192.168.43.88:80");
        assert_eq!(config.camera.frame_size(), FrameSize { width: 640, height: 480 });
        assert_eq!(config.camera.pixel_format, PixelFormat::Rgb888);
        assert_eq!(config.camera.jpeg_quality, 50);
        assert_eq!(config.receive_buffer_size, 1024);
        assert_eq!(config.timing.link_poll, Duration::from_secs(1));
        assert_eq!(config.timing.dependency_poll, Duration::from_millis(500));
        assert_eq!(config.timing.frame_interval, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_quality() {
        let mut config = StreamConfig::default();
        config.camera.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.camera.jpeg_quality = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_dimensions() {
        let mut config = StreamConfig::default();
        config.camera.width = 641;
        assert!(config.validate().is_err());

        config.camera.width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = StreamConfig::default();
        config.timing.frame_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rendered_config_hides_password() {
        let config = StreamConfig::default();
        let rendered = config.to_toml_string().unwrap();

        assert!(rendered.contains("ssid = \"Web\""));
        assert!(rendered.contains("frame_interval = 100"));
        assert!(!rendered.contains(WIFI_PASSWORD));
    }
}
