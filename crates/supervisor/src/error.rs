use std::path::PathBuf;

use gridlab_core::error::CoreError;
use gridlab_core::types::{JobClass, JobId};

/// Errors returned synchronously by supervisor operations.
///
/// Anything that goes wrong after a worker has been spawned is reported
/// through the job's terminal event instead.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("A {class} job for scenario '{scenario_key}' is already running ({existing})")]
    Conflict {
        class: JobClass,
        scenario_key: String,
        existing: JobId,
    },

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("No worker command configured for job class {0}")]
    NoWorker(JobClass),

    #[error("Failed to write job input {}: {source}", path.display())]
    InputArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Supervisor is shutting down and not accepting jobs")]
    ShuttingDown,

    #[error("Failed to spawn worker '{program}': {source}")]
    SpawnFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
