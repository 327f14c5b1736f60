//! Development server: receives frames from `camera-streamer`

use anyhow::{Context, Result};
use camera_tcp_streamer::sink::{FrameSink, SinkConfig};
use camera_tcp_streamer::wire::DEFAULT_MAX_FRAME_LEN;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "frame-sink")]
#[command(about = "Receives length-prefixed JPEG frames over TCP")]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:80")]
    listen: String,

    /// Store each received frame as frame_NNNNNN.jpg in this directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Text line sent to each device after it connects
    #[arg(short, long)]
    greeting: Option<String>,

    /// Largest accepted frame in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_bytes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    if let Some(dir) = &cli.output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Cannot create output directory {}", dir.display()))?;
        info!(dir = %dir.display(), "Storing received frames");
    }

    let listener = TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("Cannot listen on {}", cli.listen))?;

    let sink = Arc::new(FrameSink::new(SinkConfig {
        output_dir: cli.output_dir,
        greeting: cli.greeting,
        max_frame_len: cli.max_frame_bytes,
    }));

    tokio::select! {
        res = sink.serve(listener) => res.context("Accept loop failed")?,
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutting down");
        }
    }

    Ok(())
}
