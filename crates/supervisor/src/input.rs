//! The job input artifact handed to a worker.

use std::path::{Path, PathBuf};

use chrono::Utc;
use gridlab_core::protocol::PROTOCOL_VERSION;
use gridlab_core::types::{JobClass, Timestamp};
use serde::Serialize;
use serde_json::Value;

use crate::error::SupervisorError;

pub const INPUT_FILE_NAME: &str = "input.json";

/// Serialized as `<work_dir>/<job_id>/input.json`; the path is the worker's
/// last command-line argument.
#[derive(Debug, Serialize)]
pub struct JobInput<'a> {
    pub job_id: &'a str,
    pub job_class: JobClass,
    pub scenario_key: &'a str,
    pub config: &'a Value,
    pub protocol_version: u64,
    pub created_at: Timestamp,
}

impl<'a> JobInput<'a> {
    pub fn new(job_id: &'a str, job_class: JobClass, scenario_key: &'a str, config: &'a Value) -> Self {
        Self {
            job_id,
            job_class,
            scenario_key,
            config,
            protocol_version: PROTOCOL_VERSION,
            created_at: Utc::now(),
        }
    }
}

/// Directory holding a job's files.
pub fn job_dir(work_dir: &Path, job_id: &str) -> PathBuf {
    work_dir.join(job_id)
}

/// Write the input artifact and return its path.
pub async fn write_input(work_dir: &Path, input: &JobInput<'_>) -> Result<PathBuf, SupervisorError> {
    let dir = job_dir(work_dir, input.job_id);
    let path = dir.join(INPUT_FILE_NAME);
    let io_err = |source: std::io::Error| SupervisorError::InputArtifact {
        path: path.clone(),
        source,
    };

    let bytes = serde_json::to_vec_pretty(input).map_err(|e| io_err(e.into()))?;
    tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;
    tokio::fs::write(&path, bytes).await.map_err(io_err)?;
    Ok(path)
}

/// Best-effort removal of a job's directory.
pub async fn remove_job_dir(work_dir: &Path, job_id: &str) {
    let dir = job_dir(work_dir, job_id);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(job_id, dir = %dir.display(), error = %e, "Failed to remove job directory");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_input_under_job_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = serde_json::json!({ "horizon_hours": 48 });
        let input = JobInput::new("forecast-a-1", JobClass::Forecast, "a", &config);

        let path = write_input(dir.path(), &input).await.unwrap();
        assert_eq!(path, dir.path().join("forecast-a-1").join(INPUT_FILE_NAME));

        let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["job_id"], "forecast-a-1");
        assert_eq!(written["job_class"], "forecast");
        assert_eq!(written["config"]["horizon_hours"], 48);
        assert_eq!(written["protocol_version"], PROTOCOL_VERSION);

        remove_job_dir(dir.path(), "forecast-a-1").await;
        assert!(!path.exists());
        remove_job_dir(dir.path(), "forecast-a-1").await;
    }
}
