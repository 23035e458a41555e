//! Supervisor configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use gridlab_core::types::JobClass;

/// Default SIGTERM-to-kill grace period.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(10);

/// Default watchdog timeout for a single job.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default time a terminal job stays queryable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Program and leading arguments used to launch a worker.
///
/// The job input path is appended as the final argument at spawn time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a command line on whitespace. Returns `None` for a blank line.
    ///
    /// No shell quoting is interpreted.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts))
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Root under which each job gets `<job_id>/input.json`.
    pub work_dir: PathBuf,
    /// Worker launched for each job class.
    pub workers: HashMap<JobClass, WorkerCommand>,
    pub cancel_grace: Duration,
    pub watchdog_timeout: Duration,
    /// How long terminal jobs remain in the registry.
    pub retention: Duration,
}

impl SupervisorConfig {
    /// A configuration with default timings and no workers.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            workers: HashMap::new(),
            cancel_grace: DEFAULT_CANCEL_GRACE,
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_worker(mut self, class: JobClass, command: WorkerCommand) -> Self {
        self.workers.insert(class, command);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
