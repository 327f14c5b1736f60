//! Device binary: bring up WiFi, camera and server connection, then stream

// Use jemalloc for better memory management (optional feature)
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use camera_tcp_streamer::{Drivers, Pipeline, StreamConfig};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();

    let config = StreamConfig::default();
    config.validate().context("Built-in configuration is invalid")?;
    debug!(config = %config.to_toml_string()?, "Configuration");

    info!(
        ssid = %config.wifi.ssid,
        server = %config.server.endpoint(),
        resolution = %config.camera.frame_size(),
        quality = config.camera.jpeg_quality,
        "Camera streamer starting"
    );

    let drivers = build_drivers(&config)?;
    let report = Pipeline::new(config, drivers).run(interrupted()).await;

    for failure in &report.failures {
        warn!(task = %failure.task, error = %failure.error, "Task failed during run");
    }
    if !report.streamed {
        error!(readiness = ?report.readiness, "Streaming never started");
    }
    info!(
        phase = ?report.final_phase,
        captured = report.stats.frames_captured,
        sent = report.stats.frames_sent,
        dropped = report.stats.frames_dropped,
        drop_rate = format!("{:.3}", report.stats.drop_rate()),
        bytes = report.stats.bytes_sent,
        received = report.stats.messages_received,
        "Camera streamer exited"
    );

    Ok(())
}

#[cfg(target_os = "linux")]
fn build_drivers(config: &StreamConfig) -> Result<Drivers> {
    use camera_tcp_streamer::drivers::{
        default_device_path, HeadlessMedia, ImageJpegEncoder, NmcliWifi, TcpConnector, V4lCamera,
    };
    use std::sync::Arc;

    let device = default_device_path(config.camera.sensor_id);
    info!(device = %device, interface = %config.wifi.interface, "Using Linux drivers");

    Ok(Drivers {
        wifi: Arc::new(NmcliWifi::new(config.wifi.interface.clone())),
        camera: Arc::new(V4lCamera::new(device, config.camera.channel)),
        encoder: Arc::new(ImageJpegEncoder::new()),
        media: Arc::new(HeadlessMedia::new()),
        connector: Arc::new(TcpConnector::new()),
    })
}

#[cfg(not(target_os = "linux"))]
fn build_drivers(_config: &StreamConfig) -> Result<Drivers> {
    anyhow::bail!("camera-streamer needs V4L2 and NetworkManager; only Linux is supported")
}

/// Resolves on Ctrl-C or SIGTERM
async fn interrupted() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => info!("SIGTERM received"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot install SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received"),
        Err(e) => {
            // Without a handler the pipeline only stops on task failure
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await
        }
    }
}
