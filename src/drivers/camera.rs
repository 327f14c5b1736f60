//! V4L2 camera sensor

use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::{
    buffer::Type,
    io::{mmap::Stream as MmapStream, traits::CaptureStream},
    video::Capture,
    Device, Format, FourCC,
};

use super::{CameraSensor, ChannelId, Frame, FrameSize, PixelFormat};
use crate::error::DriverError;

const MMAP_BUFFERS: u32 = 4;

/// Longest a dequeue may block before the capture counts as a miss
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Device node for a sensor index
pub fn default_device_path(sensor_id: u32) -> String {
    format!("/dev/video{}", sensor_id)
}

/// Wire layout actually agreed with the kernel driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Rgb3,
    Yuyv,
}

impl Layout {
    fn bytes_per_pixel(&self) -> usize {
        match self {
            Layout::Rgb3 => 3,
            Layout::Yuyv => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Negotiated {
    layout: Layout,
    size: FrameSize,
    /// Bytes per buffer row, padding included
    stride: usize,
}

#[derive(Default)]
struct SensorState {
    // Declared first so buffers are unmapped before the device closes
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
    size: Option<FrameSize>,
    format: Option<PixelFormat>,
    negotiated: Option<Negotiated>,
}

/// Single-channel V4L2 capture device using mmap streaming I/O.
///
/// RGB3 is requested first; sensors that only offer YUYV are converted to
/// RGB888 in software.
pub struct V4lCamera {
    path: String,
    channel: ChannelId,
    state: Mutex<SensorState>,
}

impl V4lCamera {
    pub fn new(path: impl Into<String>, channel: ChannelId) -> Self {
        Self {
            path: path.into(),
            channel,
            state: Mutex::new(SensorState::default()),
        }
    }

    fn check_channel(&self, channel: ChannelId) -> Result<(), DriverError> {
        if channel != self.channel {
            return Err(DriverError::Unsupported(format!(
                "{} exposes only {}, not {}",
                self.path, self.channel, channel
            )));
        }
        Ok(())
    }

    fn negotiate(&self, device: &Device, size: FrameSize) -> Result<Negotiated, DriverError> {
        for (fourcc, layout) in [(b"RGB3", Layout::Rgb3), (b"YUYV", Layout::Yuyv)] {
            let requested = Format::new(size.width, size.height, FourCC::new(fourcc));
            let actual = device.set_format(&requested)?;
            if actual.fourcc != requested.fourcc {
                debug!(device = %self.path, requested = %requested.fourcc, got = %actual.fourcc, "Format not offered");
                continue;
            }
            if actual.width != size.width || actual.height != size.height {
                return Err(DriverError::Unsupported(format!(
                    "{} adjusted {} to {}x{}",
                    self.path, size, actual.width, actual.height
                )));
            }
            info!(device = %self.path, format = %actual, "Camera format set");
            let row = size.width as usize * layout.bytes_per_pixel();
            return Ok(Negotiated {
                layout,
                size,
                // Drivers may report 0 for packed formats
                stride: (actual.stride as usize).max(row),
            });
        }

        Err(DriverError::Unsupported(format!(
            "{} offers neither RGB3 nor YUYV at {}",
            self.path, size
        )))
    }
}

impl CameraSensor for V4lCamera {
    fn reset(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.stream = None;
        state.negotiated = None;
        state.size = None;
        state.format = None;
        if state.device.is_none() {
            state.device = Some(Device::with_path(&self.path)?);
        }
        debug!(device = %self.path, "Sensor reset");
        Ok(())
    }

    fn set_frame_size(&self, channel: ChannelId, size: FrameSize) -> Result<(), DriverError> {
        self.check_channel(channel)?;
        self.state.lock().size = Some(size);
        Ok(())
    }

    fn set_pixel_format(
        &self,
        channel: ChannelId,
        format: PixelFormat,
    ) -> Result<(), DriverError> {
        self.check_channel(channel)?;
        self.state.lock().format = Some(format);
        Ok(())
    }

    fn start(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let size = state
            .size
            .ok_or_else(|| DriverError::Unavailable("frame size not set".to_string()))?;
        if state.format.is_none() {
            return Err(DriverError::Unavailable("pixel format not set".to_string()));
        }

        let device = state
            .device
            .as_ref()
            .ok_or_else(|| DriverError::Unavailable(format!("{} not reset", self.path)))?;
        let negotiated = self.negotiate(device, size)?;
        let mut stream = MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)?;
        stream.set_timeout(DEQUEUE_TIMEOUT);

        state.negotiated = Some(negotiated);
        state.stream = Some(stream);
        info!(device = %self.path, channel = %self.channel, "Sensor frame pump started");
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if state.stream.take().is_some() {
            info!(device = %self.path, "Sensor frame pump stopped");
        }
        Ok(())
    }

    fn snapshot(&self, channel: ChannelId) -> Result<Option<Frame>, DriverError> {
        self.check_channel(channel)?;

        let mut state = self.state.lock();
        let negotiated = state
            .negotiated
            .ok_or_else(|| DriverError::Unavailable(format!("{} not started", self.path)))?;
        let stream = state
            .stream
            .as_mut()
            .ok_or_else(|| DriverError::Unavailable(format!("{} not started", self.path)))?;

        let (buf, meta) = match stream.next() {
            Ok(dequeued) => dequeued,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                warn!(device = %self.path, timeout = ?DEQUEUE_TIMEOUT, "No buffer dequeued in time");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            warn!(device = %self.path, sequence = meta.sequence, "Empty buffer dequeued");
            return Ok(None);
        }

        let size = negotiated.size;
        let row = size.width as usize * negotiated.layout.bytes_per_pixel();
        let packed = pack_rows(&buf[..used], row, negotiated.stride, size.height as usize)?;
        let data = match negotiated.layout {
            Layout::Rgb3 => packed,
            Layout::Yuyv => Bytes::from(yuyv_to_rgb888(&packed, size)?),
        };

        Ok(Some(Frame {
            channel,
            format: PixelFormat::Rgb888,
            size,
            sequence: meta.sequence as u64,
            data,
        }))
    }
}

/// Drops per-row padding so rows are `row` bytes back to back
fn pack_rows(src: &[u8], row: usize, stride: usize, height: usize) -> Result<Bytes, DriverError> {
    // Last row may come without its padding
    let needed = match height {
        0 => 0,
        h => stride * (h - 1) + row,
    };
    if src.len() < needed {
        return Err(DriverError::InvalidFrame(format!(
            "{} rows of {} bytes (stride {}) need {} bytes, got {}",
            height,
            row,
            stride,
            needed,
            src.len()
        )));
    }

    if stride == row {
        return Ok(Bytes::copy_from_slice(&src[..row * height]));
    }

    let mut out = Vec::with_capacity(row * height);
    for y in 0..height {
        let start = y * stride;
        out.extend_from_slice(&src[start..start + row]);
    }
    Ok(Bytes::from(out))
}

/// Converts packed YUYV 4:2:2 to RGB888 (BT.601, studio range)
fn yuyv_to_rgb888(src: &[u8], size: FrameSize) -> Result<Vec<u8>, DriverError> {
    let pixels = size.width as usize * size.height as usize;
    if src.len() < pixels * 2 {
        return Err(DriverError::InvalidFrame(format!(
            "YUYV {} needs {} bytes, got {}",
            size,
            pixels * 2,
            src.len()
        )));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in src[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        push_rgb(&mut rgb, y0, u, v);
        push_rgb(&mut rgb, y1, u, v);
    }
    Ok(rgb)
}

fn push_rgb(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |x: i32| x.clamp(0, 255) as u8;
    out.push(clamp((298 * c + 409 * e + 128) >> 8));
    out.push(clamp((298 * c - 100 * d - 208 * e + 128) >> 8));
    out.push(clamp((298 * c + 516 * d + 128) >> 8));
}
