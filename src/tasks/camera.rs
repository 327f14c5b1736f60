//! Camera bring-up

use std::sync::Arc;
use tracing::info;

use super::{run_blocking, TaskContext};
use crate::error::{BringUpError, TaskError};
use crate::state::Stage;

/// Configures the sensor channel, brings up display and media, starts the
/// frame pump, then publishes `camera`. Independent of WiFi and TCP.
pub async fn run(ctx: TaskContext) -> Result<(), TaskError> {
    let camera = Arc::clone(&ctx.drivers.camera);
    let media = Arc::clone(&ctx.drivers.media);
    let settings = ctx.config.camera.clone();

    info!(
        sensor = settings.sensor_id,
        channel = %settings.channel,
        resolution = %settings.frame_size(),
        format = ?settings.pixel_format,
        "Configuring camera"
    );

    run_blocking(move || {
        camera.reset()?;
        camera.set_frame_size(settings.channel, settings.frame_size())?;
        camera.set_pixel_format(settings.channel, settings.pixel_format)?;
        media.init_display(settings.frame_size())?;
        media.init_media()?;
        camera.start()
    })
    .await?
    .map_err(BringUpError::Camera)?;

    info!("Camera initialised");
    ctx.state.set(Stage::Camera);
    Ok(())
}
