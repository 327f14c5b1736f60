//! Bring-up tasks and steady-state loops
//!
//! Every task body returns `Result<(), TaskError>` and runs behind
//! [`supervised`], the single place where failures turn into log lines and,
//! for the steady-state loops, into a pipeline-wide shutdown request.

pub mod camera;
pub mod capture;
pub mod connection;
pub mod network;
pub mod receive;

use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::StreamConfig;
use crate::drivers::Drivers;
use crate::error::TaskError;
use crate::state::ReadinessState;
use crate::stats::PipelineStats;

/// Identity of a supervised task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Network,
    Camera,
    Connection,
    Capture,
    Receive,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Network => "network-bringup",
            TaskKind::Camera => "camera-bringup",
            TaskKind::Connection => "connection-bringup",
            TaskKind::Capture => "capture-send",
            TaskKind::Receive => "receive",
        }
    }

    /// Steady-state loops take the pipeline down when they fail
    pub fn is_steady_state(&self) -> bool {
        matches!(self, TaskKind::Capture | TaskKind::Receive)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a task needs, cheap to clone
#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<StreamConfig>,
    pub state: Arc<ReadinessState>,
    pub stats: Arc<PipelineStats>,
    pub drivers: Drivers,
}

/// What the orchestrator reaps from its task set
pub type TaskOutcome = (TaskKind, Result<(), TaskError>);

/// Runs a task body behind the uniform failure boundary.
///
/// Panics are caught and reported as [`TaskError::Panicked`]. A fatal error
/// in a steady-state loop requests shutdown; bring-up failures only stall the
/// readiness gate.
pub async fn supervised<F>(kind: TaskKind, state: Arc<ReadinessState>, body: F) -> TaskOutcome
where
    F: Future<Output = Result<(), TaskError>> + Send,
{
    let result = match AssertUnwindSafe(body).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
    };

    match &result {
        Ok(()) => info!(task = %kind, "Task finished"),
        Err(e) => {
            error!(task = %kind, error = %e, "Task failed");
            if kind.is_steady_state() && e.is_fatal() && state.request_shutdown() {
                info!(task = %kind, "Pipeline shutdown requested after task failure");
            }
        }
    }

    (kind, result)
}

/// Runs a blocking driver call on the blocking pool
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, TaskError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        if e.is_panic() {
            TaskError::Panicked(panic_message(e.into_panic().as_ref()))
        } else {
            TaskError::Panicked(e.to_string())
        }
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
