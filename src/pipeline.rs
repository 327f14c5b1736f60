//! Orchestrator: bring-up, readiness gate, streaming and teardown
//!
//! ```text
//! Starting → WaitingForReadiness → Streaming → ShuttingDown → Stopped
//!                     │                                         ▲
//!                     └──────── shutdown before ready ──────────┘
//! ```
//!
//! All tasks live in one supervised `JoinSet`. Teardown gives them one grace
//! period to observe the cleared `running` flag, cancels stragglers at their
//! next await point, then closes the connection exactly once.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::drivers::Drivers;
use crate::error::TaskError;
use crate::state::{ReadinessSnapshot, ReadinessState};
use crate::stats::{PipelineStats, StreamStats};
use crate::tasks::{self, supervised, run_blocking, TaskContext, TaskKind, TaskOutcome};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Starting,
    WaitingForReadiness,
    Streaming,
    ShuttingDown,
    Stopped,
}

/// A task that ended with an error
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task: TaskKind,
    pub error: String,
}

/// Summary returned when the pipeline stops
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub final_phase: Phase,

    /// Whether the readiness gate ever opened
    pub streamed: bool,

    pub readiness: ReadinessSnapshot,
    pub stats: StreamStats,
    pub failures: Vec<TaskFailure>,
}

impl PipelineReport {
    pub fn failed(&self, task: TaskKind) -> bool {
        self.failures.iter().any(|f| f.task == task)
    }
}

/// The device pipeline
pub struct Pipeline {
    ctx: TaskContext,
    phase: Phase,
    tasks: JoinSet<TaskOutcome>,
    failures: Vec<TaskFailure>,
    interrupted: bool,
    streamed: bool,
}

impl Pipeline {
    pub fn new(config: StreamConfig, drivers: Drivers) -> Self {
        Self {
            ctx: TaskContext {
                config: Arc::new(config),
                state: Arc::new(ReadinessState::new()),
                stats: Arc::new(PipelineStats::new()),
                drivers,
            },
            phase: Phase::Starting,
            tasks: JoinSet::new(),
            failures: Vec::new(),
            interrupted: false,
            streamed: false,
        }
    }

    /// Shared state, e.g. for requesting shutdown from outside
    pub fn state(&self) -> Arc<ReadinessState> {
        Arc::clone(&self.ctx.state)
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.ctx.stats)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the pipeline to completion.
    ///
    /// `interrupt` resolving (Ctrl-C, SIGTERM) requests shutdown.
    pub async fn run<F>(mut self, interrupt: F) -> PipelineReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        info!(endpoint = %self.ctx.config.server.endpoint(), "Starting bring-up");
        self.spawn(TaskKind::Network, tasks::network::run);
        self.spawn(TaskKind::Camera, tasks::camera::run);
        self.spawn(TaskKind::Connection, tasks::connection::run);

        self.enter(Phase::WaitingForReadiness);
        if !self.wait_for_readiness(interrupt.as_mut()).await {
            error!(
                readiness = ?self.ctx.state.snapshot(),
                "Initialization did not complete before shutdown; exiting"
            );
            self.drain().await;
            self.enter(Phase::Stopped);
            return self.report();
        }

        self.enter(Phase::Streaming);
        self.streamed = true;
        self.spawn(TaskKind::Capture, tasks::capture::run);
        self.spawn(TaskKind::Receive, tasks::receive::run);
        self.supervise(interrupt.as_mut()).await;

        self.enter(Phase::ShuttingDown);
        self.shut_down().await;

        self.enter(Phase::Stopped);
        let report = self.report();
        info!(
            sent = report.stats.frames_sent,
            dropped = report.stats.frames_dropped,
            bytes = report.stats.bytes_sent,
            "Pipeline stopped"
        );
        report
    }

    fn spawn<B, Fut>(&mut self, kind: TaskKind, body: B)
    where
        B: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        debug!(task = %kind, "Spawning task");
        let state = Arc::clone(&self.ctx.state);
        self.tasks
            .spawn(supervised(kind, state, body(self.ctx.clone())));
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = ?self.phase, to = ?phase, "Pipeline phase");
        self.phase = phase;
    }

    async fn wait_for_readiness<F>(&mut self, mut interrupt: Pin<&mut F>) -> bool
    where
        F: Future<Output = ()>,
    {
        let poll = self.ctx.config.timing.readiness_poll;
        loop {
            let readiness = self.ctx.state.snapshot();
            if !readiness.running {
                return false;
            }
            if readiness.all_ready() {
                return true;
            }

            tokio::select! {
                _ = self.ctx.state.pause(poll) => {}
                _ = interrupt.as_mut(), if !self.interrupted => self.on_interrupt(),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => self.record(joined),
            }
        }
    }

    async fn supervise<F>(&mut self, mut interrupt: Pin<&mut F>)
    where
        F: Future<Output = ()>,
    {
        let poll = self.ctx.config.timing.idle_poll;
        while self.ctx.state.is_running() {
            tokio::select! {
                _ = self.ctx.state.pause(poll) => {}
                _ = interrupt.as_mut(), if !self.interrupted => self.on_interrupt(),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => self.record(joined),
            }
        }
    }

    fn on_interrupt(&mut self) {
        self.interrupted = true;
        info!("Interrupt received, stopping");
        self.ctx.state.request_shutdown();
    }

    fn record(&mut self, joined: Result<TaskOutcome, JoinError>) {
        match joined {
            Ok((kind, Ok(()))) => debug!(task = %kind, "Task reaped"),
            Ok((kind, Err(e))) => self.failures.push(TaskFailure {
                task: kind,
                error: e.to_string(),
            }),
            Err(e) => {
                // Panics are caught inside `supervised`; this is cancellation
                warn!(error = %e, "Task ended outside its boundary");
            }
        }
    }

    /// Gives tasks one grace period to exit, then cancels the rest
    async fn drain(&mut self) {
        let deadline = Instant::now() + self.ctx.config.timing.grace_period;
        while !self.tasks.is_empty() {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(joined)) => self.record(joined),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        remaining = self.tasks.len(),
                        "Tasks still running after grace period; cancelling"
                    );
                    self.tasks.abort_all();
                    while let Some(joined) = self.tasks.join_next().await {
                        self.record(joined);
                    }
                    break;
                }
            }
        }
    }

    async fn shut_down(&mut self) {
        self.ctx.state.request_shutdown();
        self.drain().await;

        if let Some(connection) = self.ctx.state.take_connection() {
            let grace = self.ctx.config.timing.grace_period;
            match tokio::time::timeout(grace, connection.close()).await {
                Ok(Ok(())) => info!(peer = %connection.peer(), "Connection closed"),
                Ok(Err(e)) => debug!(peer = %connection.peer(), error = %e, "Close error ignored"),
                Err(_) => warn!(peer = %connection.peer(), "Connection close timed out"),
            }
        }

        if self.ctx.state.get(crate::state::Flag::Camera) {
            // A snapshot abandoned mid-dequeue may still hold the sensor
            let camera = Arc::clone(&self.ctx.drivers.camera);
            let grace = self.ctx.config.timing.grace_period;
            match tokio::time::timeout(grace, run_blocking(move || camera.stop())).await {
                Ok(Ok(Ok(()))) => debug!("Camera stopped"),
                Ok(Ok(Err(e))) => warn!(error = %e, "Camera stop failed"),
                Ok(Err(e)) => warn!(error = %e, "Camera stop failed"),
                Err(_) => warn!(grace = ?grace, "Camera stop timed out; leaving it to the driver"),
            }
        }
    }

    fn report(&self) -> PipelineReport {
        PipelineReport {
            final_phase: self.phase,
            streamed: self.streamed,
            readiness: self.ctx.state.snapshot(),
            stats: self.ctx.stats.snapshot(),
            failures: self.failures.clone(),
        }
    }
}
