//! Camera-to-TCP JPEG frame streaming for embedded Linux boards
//!
//! The device brings up three things concurrently (WiFi link, camera sensor,
//! TCP connection to a fixed server), waits until all of them are ready, then
//! runs a capture/encode/send loop next to a receive loop until shutdown:
//! - Single-lock readiness state shared by every task
//! - Length-prefixed wire framing (`[u32 BE length][JPEG bytes]`)
//! - Hardware collaborators behind traits, with Linux implementations
//! - Supervised task set with a bounded grace-period teardown
//!
//! # Example
//!
//! ```no_run
//! use camera_tcp_streamer::{Drivers, Pipeline, StreamConfig};
//!
//! # async fn run(drivers: Drivers) {
//! let pipeline = Pipeline::new(StreamConfig::default(), drivers);
//! let report = pipeline.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! println!("sent {} frames", report.stats.frames_sent);
//! # }
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod state;
pub mod stats;
pub mod tasks;
pub mod wire;

// Re-exports for convenience
pub use config::StreamConfig;
pub use drivers::Drivers;
pub use error::{DriverError, TaskError, TransportError};
pub use pipeline::{Phase, Pipeline, PipelineReport, TaskFailure};
pub use state::{Connection, Flag, ReadinessState, Stage};
pub use stats::{PipelineStats, StreamStats};
