//! Capture, encode and send loop

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use super::{run_blocking, TaskContext};
use crate::drivers::ChannelId;
use crate::error::{TaskError, TransportError};
use crate::state::Flag;
use crate::stats::StatsWindow;

/// Periodic stats logging, in sent frames
const STATS_LOG_EVERY: u64 = 100;

/// Waits for `camera` and `tcp`, then captures, encodes and sends one frame
/// per iteration until shutdown.
///
/// No frame is captured before both flags have been observed, and nothing is
/// captured or sent once shutdown has been observed.
pub async fn run(ctx: TaskContext) -> Result<(), TaskError> {
    let timing = &ctx.config.timing;
    if !ctx
        .state
        .wait_for(&[Flag::Camera, Flag::Tcp], timing.dependency_poll)
        .await
    {
        debug!("Shutdown before camera and connection were ready");
        return Ok(());
    }

    let channel = ctx.config.camera.channel;
    let quality = ctx.config.camera.jpeg_quality;
    info!(channel = %channel, quality, "Capture loop started");

    let mut window = StatsWindow::new(STATS_LOG_EVERY, Instant::now());
    while ctx.state.is_running() {
        step(&ctx, channel, quality).await?;

        let stats = ctx.stats.snapshot();
        if let Some(rates) = window.advance(stats, Instant::now()) {
            info!(
                sent = stats.frames_sent,
                fps = format!("{:.1}", rates.fps),
                kbps = format!("{:.0}", rates.bitrate_kbps),
                drop_rate = format!("{:.3}", rates.drop_rate),
                misses = stats.capture_misses,
                "Stats"
            );
        }
        ctx.state.pause(timing.frame_interval).await;
    }

    let stats = ctx.stats.snapshot();
    info!(
        sent = stats.frames_sent,
        dropped = stats.frames_dropped,
        misses = stats.capture_misses,
        "Capture loop stopped"
    );
    Ok(())
}

async fn step(ctx: &TaskContext, channel: ChannelId, quality: u8) -> Result<(), TaskError> {
    let camera = Arc::clone(&ctx.drivers.camera);
    let frame = match run_blocking(move || camera.snapshot(channel))
        .await?
        .map_err(TaskError::Capture)?
    {
        Some(frame) => frame,
        None => {
            warn!(channel = %channel, "Capture yielded no frame");
            ctx.stats.record_capture_miss();
            return Ok(());
        }
    };
    ctx.stats.record_capture();
    let sequence = frame.sequence;

    if !ctx.state.is_running() {
        return Ok(());
    }

    // The frame moves into the encoder and ends with this iteration
    let encoder = Arc::clone(&ctx.drivers.encoder);
    let payload = match run_blocking(move || encoder.encode_jpeg(&frame, quality)).await? {
        Ok(payload) => payload,
        Err(e) => {
            warn!(sequence, error = %e, "JPEG encode failed; frame dropped");
            ctx.stats.record_drop();
            return Ok(());
        }
    };

    if !ctx.state.is_running() {
        return Ok(());
    }

    let Some(connection) = ctx.state.connection() else {
        if !ctx.state.is_running() {
            return Ok(());
        }
        return Err(TransportError::NotConnected.into());
    };

    let len = payload.len();
    match connection.send_frame(payload).await {
        Ok(wire_bytes) => {
            ctx.stats.record_sent(wire_bytes);
            trace!(sequence, len, "Frame sent");
            Ok(())
        }
        // Shutdown raced the write; the orchestrator owns the teardown
        Err(e) if !ctx.state.is_running() => {
            debug!(sequence, error = %e, "Send interrupted by shutdown");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
