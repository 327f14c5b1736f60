//! Software JPEG encoding

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

use super::{Frame, FrameEncoder, PixelFormat};
use crate::error::DriverError;

/// Baseline JPEG encoder backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageJpegEncoder;

impl ImageJpegEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl FrameEncoder for ImageJpegEncoder {
    fn encode_jpeg(&self, frame: &Frame, quality: u8) -> Result<Bytes, DriverError> {
        if !(1..=100).contains(&quality) {
            return Err(DriverError::Encode(format!(
                "quality must be between 1 and 100, got {}",
                quality
            )));
        }

        if frame.data.len() != frame.expected_len() {
            return Err(DriverError::InvalidFrame(format!(
                "{} frame of {} carries {} bytes, expected {}",
                frame.channel,
                frame.size,
                frame.data.len(),
                frame.expected_len()
            )));
        }

        let color = match frame.format {
            PixelFormat::Rgb888 => ColorType::Rgb8,
        };

        // JPEG at mid quality lands well under a tenth of the raw size
        let mut out = Vec::with_capacity(frame.data.len() / 10);
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(&frame.data, frame.size.width, frame.size.height, color)
            .map_err(|e| DriverError::Encode(e.to_string()))?;

        Ok(Bytes::from(out))
    }
}
