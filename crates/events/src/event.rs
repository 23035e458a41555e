//! The progress event envelope.

use chrono::Utc;
use gridlab_core::job_events::EventKind;
use gridlab_core::types::{FailureKind, JobClass, JobId, JobStatus, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which worker output stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Kind-specific event data.
///
/// Serialized with an internal `kind` tag so the JSON carried on the
/// wire reads `{"kind": "progress", "percent": 40.0, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Progress {
        percent: f64,
        message: String,
    },
    Log {
        stream: LogStream,
        line: String,
    },
    ItemCompleted {
        item: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<Value>,
    },
    ItemFailed {
        item: String,
        error: String,
    },
    Terminal {
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<FailureKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Progress { .. } => EventKind::Progress,
            EventPayload::Log { .. } => EventKind::Log,
            EventPayload::ItemCompleted { .. } => EventKind::ItemCompleted,
            EventPayload::ItemFailed { .. } => EventKind::ItemFailed,
            EventPayload::Terminal { .. } => EventKind::Terminal,
        }
    }
}

/// One structured unit of job progress.
///
/// Immutable once built. `seq` increases by one per event within a job,
/// starting at zero, so consumers can spot gaps after a reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub job_class: JobClass,
    pub seq: u64,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ProgressEvent {
    pub fn new(job_id: impl Into<JobId>, job_class: JobClass, seq: u64, payload: EventPayload) -> Self {
        Self {
            job_id: job_id.into(),
            job_class,
            seq,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() == EventKind::Terminal
    }

    /// Final status carried by a terminal event.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        match &self.payload {
            EventPayload::Terminal { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_flat_with_kind_tag() {
        let event = ProgressEvent::new(
            "forecast-a-1",
            JobClass::Forecast,
            3,
            EventPayload::Progress {
                percent: 40.0,
                message: "fitting".into(),
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "progress");
        assert_eq!(json["job_id"], "forecast-a-1");
        assert_eq!(json["job_class"], "forecast");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["percent"], 40.0);
        assert_eq!(json["message"], "fitting");
    }

    #[test]
    fn terminal_without_error_omits_field() {
        let event = ProgressEvent::new(
            "j",
            JobClass::NetworkOptimization,
            0,
            EventPayload::Terminal {
                status: JobStatus::Completed,
                failure: None,
                error: None,
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "terminal");
        assert_eq!(json["status"], "completed");
        assert!(json.get("error").is_none());
        assert!(json.get("failure").is_none());
        assert_eq!(event.terminal_status(), Some(JobStatus::Completed));
        assert!(event.is_terminal());
    }

    #[test]
    fn kind_matches_payload() {
        let log = EventPayload::Log {
            stream: LogStream::Stderr,
            line: "warn".into(),
        };
        assert_eq!(log.kind(), EventKind::Log);
        assert!(log.kind().is_droppable());
        assert!(!EventKind::Terminal.is_droppable());
    }
}
