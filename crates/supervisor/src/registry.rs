//! In-memory job registry.
//!
//! The registry owns every job record and the index of active
//! `(class, scenario_key)` pairs. Submission reserves the pair before the
//! worker is spawned, so two concurrent submissions for the same scenario
//! cannot both get past the check. The reservation is released when the
//! job reaches a terminal status or when its spawn fails.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use gridlab_core::types::{FailureKind, JobClass, JobId, JobStatus, Timestamp};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::SupervisorError;

/// Point-in-time view of a job, safe to hand out to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub job_class: JobClass,
    pub scenario_key: String,
    pub status: JobStatus,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cancel_requested: bool,
}

/// Optional filters for [`JobRegistry::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    pub job_class: Option<JobClass>,
    pub status: Option<JobStatus>,
}

impl JobFilter {
    fn matches(&self, record: &JobRecord) -> bool {
        self.job_class.map_or(true, |c| c == record.class)
            && self.status.map_or(true, |s| s == record.status)
    }
}

pub(crate) struct JobRecord {
    id: JobId,
    class: JobClass,
    scenario_key: String,
    status: JobStatus,
    start_time: Timestamp,
    end_time: Option<Timestamp>,
    pid: Option<u32>,
    failure: Option<FailureKind>,
    error: Option<String>,
    cancel_requested: bool,
    cancel: CancellationToken,
}

impl JobRecord {
    pub(crate) fn running(
        id: JobId,
        class: JobClass,
        scenario_key: String,
        pid: Option<u32>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            class,
            scenario_key,
            status: JobStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            pid,
            failure: None,
            error: None,
            cancel_requested: false,
            cancel,
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            job_class: self.class,
            scenario_key: self.scenario_key.clone(),
            status: self.status,
            start_time: self.start_time,
            end_time: self.end_time,
            pid: self.pid,
            failure: self.failure,
            error: self.error.clone(),
            cancel_requested: self.cancel_requested,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<JobId, JobRecord>,
    /// Active (reserved or running) job per scenario.
    active: HashMap<(JobClass, String), JobId>,
}

#[derive(Default)]
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `(class, scenario_key)` for `job_id`, or report the job that
    /// already holds it.
    pub(crate) fn reserve(
        &self,
        class: JobClass,
        scenario_key: &str,
        job_id: &str,
    ) -> Result<(), SupervisorError> {
        let mut inner = self.inner.lock();
        let slot = (class, scenario_key.to_string());
        if let Some(existing) = inner.active.get(&slot) {
            return Err(SupervisorError::Conflict {
                class,
                scenario_key: scenario_key.to_string(),
                existing: existing.clone(),
            });
        }
        inner.active.insert(slot, job_id.to_string());
        Ok(())
    }

    /// Drop a reservation that never became a running job.
    pub(crate) fn release(&self, class: JobClass, scenario_key: &str, job_id: &str) {
        let mut inner = self.inner.lock();
        let slot = (class, scenario_key.to_string());
        if inner.active.get(&slot).is_some_and(|id| id == job_id) {
            inner.active.remove(&slot);
        }
    }

    pub(crate) fn insert_running(&self, record: JobRecord) {
        self.inner.lock().jobs.insert(record.id.clone(), record);
    }

    /// Mark a running job as cancel-requested and hand back its token.
    ///
    /// Returns `Ok(None)` when the job is already terminal.
    pub(crate) fn request_cancel(
        &self,
        job_id: &str,
    ) -> Result<Option<CancellationToken>, SupervisorError> {
        let mut inner = self.inner.lock();
        let record = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| SupervisorError::NotFound(job_id.to_string()))?;
        if record.status.is_terminal() {
            return Ok(None);
        }
        record.cancel_requested = true;
        Ok(Some(record.cancel.clone()))
    }

    /// Move a running job to a terminal status and free its scenario slot.
    ///
    /// An acknowledged cancel request overrides `status`: the check runs
    /// under the same lock as [`JobRegistry::request_cancel`], so a cancel
    /// that was acknowledged always ends as `Cancelled`. Returns the final
    /// snapshot, or `None` if the job is unknown or already terminal.
    pub(crate) fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        failure: Option<FailureKind>,
        error: Option<String>,
    ) -> Option<JobSnapshot> {
        debug_assert!(status.is_terminal());
        let mut inner = self.inner.lock();
        let record = inner.jobs.get_mut(job_id)?;
        if record.status.is_terminal() {
            return None;
        }
        if record.cancel_requested {
            record.status = JobStatus::Cancelled;
            record.failure = None;
            record.error = None;
        } else {
            record.status = status;
            record.failure = failure;
            record.error = error;
        }
        record.end_time = Some(Utc::now());
        let snapshot = record.snapshot();
        let slot = (record.class, record.scenario_key.clone());

        if inner.active.get(&slot).is_some_and(|id| id == job_id) {
            inner.active.remove(&slot);
        }
        Some(snapshot)
    }

    pub fn get(&self, job_id: &str) -> Option<JobSnapshot> {
        self.inner.lock().jobs.get(job_id).map(JobRecord::snapshot)
    }

    /// Jobs matching `filter`, newest first.
    pub fn list(&self, filter: &JobFilter) -> Vec<JobSnapshot> {
        let inner = self.inner.lock();
        let mut jobs: Vec<JobSnapshot> = inner
            .jobs
            .values()
            .filter(|r| filter.matches(r))
            .map(JobRecord::snapshot)
            .collect();
        jobs.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| b.id.cmp(&a.id))
        });
        jobs
    }

    pub fn running_count(&self) -> usize {
        self.inner
            .lock()
            .jobs
            .values()
            .filter(|r| r.status == JobStatus::Running)
            .count()
    }

    pub fn running_ids(&self) -> Vec<JobId> {
        self.inner
            .lock()
            .jobs
            .values()
            .filter(|r| r.status == JobStatus::Running)
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove terminal jobs that ended more than `retention` ago.
    ///
    /// Returns the ids that were removed. Running jobs are never removed.
    pub fn sweep_expired(&self, retention: Duration) -> Vec<JobId> {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return Vec::new();
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return Vec::new();
        };

        let mut inner = self.inner.lock();
        let expired: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|r| r.end_time.is_some_and(|end| end <= cutoff))
            .map(|r| r.id.clone())
            .collect();
        for id in &expired {
            inner.jobs.remove(id);
        }
        expired
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn start(registry: &JobRegistry, id: &str, class: JobClass, key: &str) {
        registry.reserve(class, key, id).unwrap();
        registry.insert_running(JobRecord::running(
            id.to_string(),
            class,
            key.to_string(),
            None,
            CancellationToken::new(),
        ));
    }

    // ---- Test: reservation ----

    #[test]
    fn second_reservation_for_same_scenario_conflicts() {
        let registry = JobRegistry::new();
        start(&registry, "a", JobClass::Forecast, "scenario-A");

        let err = registry
            .reserve(JobClass::Forecast, "scenario-A", "b")
            .unwrap_err();
        assert_matches!(err, SupervisorError::Conflict { existing, .. } if existing == "a");
    }

    #[test]
    fn same_key_in_other_class_does_not_conflict() {
        let registry = JobRegistry::new();
        start(&registry, "a", JobClass::Forecast, "scenario-A");
        assert!(registry
            .reserve(JobClass::NetworkOptimization, "scenario-A", "b")
            .is_ok());
    }

    #[test]
    fn released_reservation_can_be_taken_again() {
        let registry = JobRegistry::new();
        registry.reserve(JobClass::Forecast, "k", "a").unwrap();
        registry.release(JobClass::Forecast, "k", "a");
        assert!(registry.reserve(JobClass::Forecast, "k", "b").is_ok());
    }

    #[test]
    fn release_ignores_foreign_reservation() {
        let registry = JobRegistry::new();
        registry.reserve(JobClass::Forecast, "k", "a").unwrap();
        registry.release(JobClass::Forecast, "k", "someone-else");
        assert!(registry.reserve(JobClass::Forecast, "k", "b").is_err());
    }

    // ---- Test: lifecycle ----

    #[test]
    fn finish_is_monotonic_and_frees_the_scenario() {
        let registry = JobRegistry::new();
        start(&registry, "a", JobClass::Forecast, "k");

        assert!(registry.finish("a", JobStatus::Completed, None, None).is_some());
        assert!(registry
            .finish(
                "a",
                JobStatus::Failed,
                Some(FailureKind::WorkerFailure),
                Some("late".into())
            )
            .is_none());

        let snapshot = registry.get("a").unwrap();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert!(snapshot.end_time.is_some());
        assert!(snapshot.error.is_none());
        assert!(registry.reserve(JobClass::Forecast, "k", "b").is_ok());
    }

    #[test]
    fn cancel_on_terminal_job_is_noop() {
        let registry = JobRegistry::new();
        start(&registry, "a", JobClass::Forecast, "k");
        registry.finish("a", JobStatus::Completed, None, None);

        assert!(registry.request_cancel("a").unwrap().is_none());
        assert!(!registry.get("a").unwrap().cancel_requested);
    }

    #[test]
    fn cancel_unknown_job_is_not_found() {
        let registry = JobRegistry::new();
        assert_matches!(
            registry.request_cancel("missing"),
            Err(SupervisorError::NotFound(id)) if id == "missing"
        );
    }

    #[test]
    fn cancel_marks_running_job() {
        let registry = JobRegistry::new();
        start(&registry, "a", JobClass::Forecast, "k");
        let token = registry.request_cancel("a").unwrap().unwrap();
        assert!(!token.is_cancelled(), "caller decides when to fire");
        assert!(registry.get("a").unwrap().cancel_requested);
    }

    #[test]
    fn acknowledged_cancel_wins_over_late_exit_status() {
        let registry = JobRegistry::new();
        start(&registry, "a", JobClass::Forecast, "k");
        registry.request_cancel("a").unwrap().unwrap();

        let snapshot = registry
            .finish(
                "a",
                JobStatus::Failed,
                Some(FailureKind::WorkerFailure),
                Some("Worker exited with code 1".into()),
            )
            .unwrap();
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert!(snapshot.failure.is_none());
        assert!(snapshot.error.is_none());
        assert_eq!(registry.get("a").unwrap(), snapshot);
    }

    #[test]
    fn cancel_racing_finish_is_acknowledged_only_if_it_wins() {
        // Each round races one cancel against one finish on two threads.
        for round in 0..200 {
            let registry = std::sync::Arc::new(JobRegistry::new());
            let id = format!("job-{round}");
            start(&registry, &id, JobClass::Forecast, "k");

            let canceller = {
                let registry = std::sync::Arc::clone(&registry);
                let id = id.clone();
                std::thread::spawn(move || registry.request_cancel(&id).unwrap().is_some())
            };
            let finished = registry
                .finish(&id, JobStatus::Completed, None, None)
                .unwrap();
            let acknowledged = canceller.join().unwrap();

            let final_status = registry.get(&id).unwrap().status;
            assert_eq!(final_status, finished.status);
            if acknowledged {
                assert_eq!(final_status, JobStatus::Cancelled, "round {round}");
            } else {
                assert_eq!(final_status, JobStatus::Completed, "round {round}");
            }
        }
    }

    // ---- Test: queries ----

    #[test]
    fn list_filters_by_class_and_status() {
        let registry = JobRegistry::new();
        start(&registry, "f1", JobClass::Forecast, "a");
        start(&registry, "f2", JobClass::Forecast, "b");
        start(&registry, "o1", JobClass::NetworkOptimization, "a");
        registry.finish("f1", JobStatus::Completed, None, None);

        let forecasts = registry.list(&JobFilter {
            job_class: Some(JobClass::Forecast),
            status: None,
        });
        assert_eq!(forecasts.len(), 2);

        let running = registry.list(&JobFilter {
            job_class: None,
            status: Some(JobStatus::Running),
        });
        let ids: Vec<&str> = running.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"f2") && ids.contains(&"o1"));
        assert_eq!(registry.running_count(), 2);
    }

    #[test]
    fn sweep_removes_only_expired_terminal_jobs() {
        let registry = JobRegistry::new();
        start(&registry, "done", JobClass::Forecast, "a");
        start(&registry, "live", JobClass::Forecast, "b");
        registry.finish("done", JobStatus::Failed, Some(FailureKind::Timeout), None);

        assert!(registry.sweep_expired(Duration::from_secs(3600)).is_empty());

        let removed = registry.sweep_expired(Duration::ZERO);
        assert_eq!(removed, vec!["done".to_string()]);
        assert!(registry.get("done").is_none());
        assert!(registry.get("live").is_some());
        assert_eq!(registry.len(), 1);
    }
}
