//! Job supervisor: submission, monitoring and cancellation of workers.
//!
//! Each accepted job owns one OS process and three tasks: a stdout reader,
//! a stderr reader and a monitor. The monitor waits for whichever comes
//! first of process exit, cancellation and the watchdog, terminates the
//! worker if needed, drains the readers and then publishes the single
//! terminal event. The registry is updated before that event goes out, so
//! a client that sees the terminal event and then asks for the job's
//! status gets the terminal status.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gridlab_core::job::{new_job_id, validate_scenario_key};
use gridlab_core::types::{FailureKind, JobClass, JobId, JobStatus};
use gridlab_events::{JobEmitter, ProgressBus};
use serde_json::Value;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{SupervisorConfig, WorkerCommand};
use crate::error::SupervisorError;
use crate::input::{self, JobInput};
use crate::process;
use crate::registry::{JobFilter, JobRecord, JobRegistry, JobSnapshot};

/// Environment variable carrying the job id into the worker.
pub const ENV_JOB_ID: &str = "GRIDLAB_JOB_ID";

/// Environment variable carrying the job class into the worker.
pub const ENV_JOB_CLASS: &str = "GRIDLAB_JOB_CLASS";

/// How long the monitor waits for output readers after the worker exits.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Supervisor {
    config: SupervisorConfig,
    registry: Arc<JobRegistry>,
    bus: Arc<ProgressBus>,
    tasks: TaskTracker,
    accepting: AtomicBool,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, registry: Arc<JobRegistry>, bus: Arc<ProgressBus>) -> Self {
        Self {
            config,
            registry,
            bus,
            tasks: TaskTracker::new(),
            accepting: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Start a worker for `(class, scenario_key)` and return the new job id.
    ///
    /// Returns once the process has been spawned; all later progress is
    /// reported on the class channel.
    pub async fn submit(
        &self,
        class: JobClass,
        scenario_key: &str,
        config: &Value,
    ) -> Result<JobId, SupervisorError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SupervisorError::ShuttingDown);
        }
        validate_scenario_key(scenario_key)?;
        let command = self
            .config
            .workers
            .get(&class)
            .ok_or(SupervisorError::NoWorker(class))?;

        let job_id = new_job_id(class, scenario_key);
        self.registry.reserve(class, scenario_key, &job_id)?;
        let reservation = Reservation {
            registry: &self.registry,
            class,
            scenario_key,
            job_id: &job_id,
            armed: true,
        };

        match self.launch(class, scenario_key, config, command, &job_id).await {
            Ok(()) => {
                reservation.keep();
                Ok(job_id)
            }
            Err(e) => {
                drop(reservation);
                input::remove_job_dir(&self.config.work_dir, &job_id).await;
                tracing::error!(
                    job_id = %job_id,
                    job_class = %class,
                    error = %e,
                    "Job submission failed",
                );
                Err(e)
            }
        }
    }

    async fn launch(
        &self,
        class: JobClass,
        scenario_key: &str,
        config: &Value,
        command: &WorkerCommand,
        job_id: &str,
    ) -> Result<(), SupervisorError> {
        let job_input = JobInput::new(job_id, class, scenario_key, config);
        let input_path = input::write_input(&self.config.work_dir, &job_input).await?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .arg(&input_path)
            .env(ENV_JOB_ID, job_id)
            .env(ENV_JOB_CLASS, class.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so termination reaches anything the worker forks.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::SpawnFailure {
            program: command.program.clone(),
            source,
        })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let emitter = Arc::new(JobEmitter::new(job_id, self.bus.channel(class)));
        let cancel = CancellationToken::new();

        self.registry.insert_running(JobRecord::running(
            job_id.to_string(),
            class,
            scenario_key.to_string(),
            pid,
            cancel.clone(),
        ));

        let stdout_task = stdout.map(|s| self.tasks.spawn(process::read_stdout(s, Arc::clone(&emitter))));
        let stderr_task = stderr.map(|s| self.tasks.spawn(process::read_stderr(s, Arc::clone(&emitter))));

        let monitor = JobMonitor {
            job_id: job_id.to_string(),
            child,
            emitter,
            registry: Arc::clone(&self.registry),
            cancel,
            grace: self.config.cancel_grace,
            watchdog: self.config.watchdog_timeout,
            stdout_task,
            stderr_task,
        };
        self.tasks.spawn(monitor.run());

        tracing::info!(
            job_id,
            job_class = %class,
            scenario_key,
            pid = ?pid,
            "Job started",
        );
        Ok(())
    }

    /// Request cancellation of a running job.
    ///
    /// Returns `Ok(false)` when the job is already terminal. The worker is
    /// stopped asynchronously; watch for the terminal event or poll
    /// [`Supervisor::status`].
    pub fn cancel(&self, job_id: &str) -> Result<bool, SupervisorError> {
        match self.registry.request_cancel(job_id)? {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id, "Job cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn status(&self, job_id: &str) -> Result<JobSnapshot, SupervisorError> {
        self.registry
            .get(job_id)
            .ok_or_else(|| SupervisorError::NotFound(job_id.to_string()))
    }

    pub fn list(&self, filter: &JobFilter) -> Vec<JobSnapshot> {
        self.registry.list(filter)
    }

    pub fn running_count(&self) -> usize {
        self.registry.running_count()
    }

    /// Drop terminal jobs past the retention window, along with their work
    /// directories. Returns how many jobs were removed.
    pub async fn sweep_expired(&self) -> usize {
        let removed = self.registry.sweep_expired(self.config.retention);
        for job_id in &removed {
            input::remove_job_dir(&self.config.work_dir, job_id).await;
        }
        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), "Expired jobs removed from registry");
        }
        removed.len()
    }

    /// Stop accepting jobs, cancel every running job and wait up to
    /// `timeout` for their monitors to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        self.accepting.store(false, Ordering::Release);

        let running = self.registry.running_ids();
        for job_id in &running {
            if let Err(e) = self.cancel(job_id) {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to cancel job during shutdown");
            }
        }
        tracing::info!(count = running.len(), "Cancelling running jobs for shutdown");

        self.tasks.close();
        if tokio::time::timeout(timeout, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Job monitors still running after shutdown timeout",
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Reservation guard
// ---------------------------------------------------------------------------

/// Releases a scenario reservation unless the job was started.
///
/// Covers the submitting future being dropped mid-launch as well as
/// explicit failures.
struct Reservation<'a> {
    registry: &'a JobRegistry,
    class: JobClass,
    scenario_key: &'a str,
    job_id: &'a str,
    armed: bool,
}

impl Reservation<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry
                .release(self.class, self.scenario_key, self.job_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

enum Stop {
    Exited(io::Result<ExitStatus>),
    Cancelled,
    WatchdogExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopKind {
    Exited,
    Cancelled,
    WatchdogExpired,
}

struct JobMonitor {
    job_id: JobId,
    child: Child,
    emitter: Arc<JobEmitter>,
    registry: Arc<JobRegistry>,
    cancel: CancellationToken,
    grace: Duration,
    watchdog: Duration,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<String>>,
}

impl JobMonitor {
    async fn run(mut self) {
        let stop = tokio::select! {
            status = self.child.wait() => Stop::Exited(status),
            () = self.cancel.cancelled() => Stop::Cancelled,
            () = tokio::time::sleep(self.watchdog) => Stop::WatchdogExpired,
        };

        let (kind, exit) = match stop {
            Stop::Exited(status) => (StopKind::Exited, status),
            Stop::Cancelled => {
                tracing::info!(job_id = %self.job_id, "Terminating cancelled worker");
                (StopKind::Cancelled, process::terminate(&mut self.child, self.grace).await)
            }
            Stop::WatchdogExpired => {
                tracing::warn!(
                    job_id = %self.job_id,
                    watchdog_secs = self.watchdog.as_secs(),
                    "Watchdog expired, terminating worker",
                );
                (StopKind::WatchdogExpired, process::terminate(&mut self.child, self.grace).await)
            }
        };

        let stderr_tail = self.drain_readers().await;
        let exit = exit.map(|status| status.code()).map_err(|e| e.to_string());
        let outcome = classify(kind, exit, &stderr_tail, self.watchdog);

        // The registry has the last word: a cancel acknowledged while the
        // worker was exiting turns the outcome into Cancelled.
        let Some(snapshot) = self.registry.finish(
            &self.job_id,
            outcome.status,
            outcome.failure,
            outcome.error,
        ) else {
            tracing::warn!(job_id = %self.job_id, "Job already finished, skipping terminal event");
            return;
        };
        self.emitter
            .terminate(snapshot.status, snapshot.failure, snapshot.error.clone());

        match snapshot.status {
            JobStatus::Failed => tracing::warn!(
                job_id = %self.job_id,
                failure = ?snapshot.failure,
                error = snapshot.error.as_deref().unwrap_or_default(),
                "Job failed",
            ),
            status => tracing::info!(
                job_id = %self.job_id,
                status = %status,
                events = self.emitter.emitted(),
                "Job finished",
            ),
        }
    }

    /// Wait for both readers to hit end of stream. Returns the stderr tail.
    ///
    /// A reader still blocked after the drain timeout (a grandchild holding
    /// the pipe open) is aborted.
    async fn drain_readers(&mut self) -> String {
        if let Some(mut task) = self.stdout_task.take() {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!(job_id = %self.job_id, "stdout reader did not finish, aborting");
                task.abort();
            }
        }

        let Some(mut task) = self.stderr_task.take() else {
            return String::new();
        };
        match tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut task).await {
            Ok(Ok(tail)) => tail,
            Ok(Err(e)) => {
                tracing::warn!(job_id = %self.job_id, error = %e, "stderr reader failed");
                String::new()
            }
            Err(_) => {
                tracing::warn!(job_id = %self.job_id, "stderr reader did not finish, aborting");
                task.abort();
                String::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Outcome {
    status: JobStatus,
    failure: Option<FailureKind>,
    error: Option<String>,
}

impl Outcome {
    fn new(status: JobStatus) -> Self {
        Self {
            status,
            failure: None,
            error: None,
        }
    }

    fn failed(failure: FailureKind, error: String) -> Self {
        Self {
            status: JobStatus::Failed,
            failure: Some(failure),
            error: Some(error),
        }
    }
}

/// Decide a job's terminal status from how the monitor stopped.
///
/// `exit` is the exit code (`None` when killed by a signal) or the error
/// from waiting on the process. Cancel requests that raced a natural exit
/// are applied afterwards by [`JobRegistry::finish`].
fn classify(
    kind: StopKind,
    exit: Result<Option<i32>, String>,
    stderr_tail: &str,
    watchdog: Duration,
) -> Outcome {
    if kind == StopKind::Cancelled {
        return Outcome::new(JobStatus::Cancelled);
    }
    if kind == StopKind::WatchdogExpired {
        return Outcome::failed(
            FailureKind::Timeout,
            format!("Job exceeded the watchdog timeout of {}s", watchdog.as_secs()),
        );
    }

    let with_tail = |message: String| {
        if stderr_tail.is_empty() {
            message
        } else {
            format!("{message}: {stderr_tail}")
        }
    };
    match exit {
        Ok(Some(0)) => Outcome::new(JobStatus::Completed),
        Ok(Some(code)) => Outcome::failed(
            FailureKind::WorkerFailure,
            with_tail(format!("Worker exited with code {code}")),
        ),
        Ok(None) => Outcome::failed(
            FailureKind::WorkerFailure,
            with_tail("Worker was terminated by a signal".to_string()),
        ),
        Err(e) => Outcome::failed(
            FailureKind::WorkerFailure,
            format!("Failed to wait for worker: {e}"),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
