//! Virtual display for headless boards

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{FrameSize, MediaBackend};
use crate::error::DriverError;

#[derive(Debug, Default)]
struct MediaState {
    display: Option<FrameSize>,
    media_ready: bool,
}

/// Media backend without a physical panel.
///
/// Sizes a virtual display to the capture resolution; media buffers can only
/// be brought up once the display exists.
#[derive(Debug, Default)]
pub struct HeadlessMedia {
    state: Mutex<MediaState>,
}

impl HeadlessMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_size(&self) -> Option<FrameSize> {
        self.state.lock().display
    }

    pub fn is_media_ready(&self) -> bool {
        self.state.lock().media_ready
    }
}

impl MediaBackend for HeadlessMedia {
    fn init_display(&self, size: FrameSize) -> Result<(), DriverError> {
        if size.width == 0 || size.height == 0 {
            return Err(DriverError::Unsupported(format!(
                "virtual display of {}",
                size
            )));
        }

        let mut state = self.state.lock();
        if let Some(existing) = state.display {
            debug!(from = %existing, to = %size, "Resizing virtual display");
        }
        state.display = Some(size);
        info!(resolution = %size, "Virtual display initialised");
        Ok(())
    }

    fn init_media(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if state.display.is_none() {
            return Err(DriverError::Unavailable(
                "media buffers need an initialised display".to_string(),
            ));
        }
        state.media_ready = true;
        info!("Media buffers initialised");
        Ok(())
    }
}
