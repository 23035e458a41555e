//! Progress event kinds.
//!
//! The wire name of each kind doubles as the SSE `event:` field on the
//! streaming endpoints.

use serde::{Deserialize, Serialize};

/// Percentage progress update from the worker.
pub const EVENT_PROGRESS: &str = "progress";

/// Opaque worker output line (stdout or stderr).
pub const EVENT_LOG: &str = "log";

/// One unit of work inside the job finished.
pub const EVENT_ITEM_COMPLETED: &str = "item_completed";

/// One unit of work inside the job failed.
pub const EVENT_ITEM_FAILED: &str = "item_failed";

/// Final event of a job. Exactly one per job, always last.
pub const EVENT_TERMINAL: &str = "terminal";

/// Kind discriminant of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Progress,
    Log,
    ItemCompleted,
    ItemFailed,
    Terminal,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Progress => EVENT_PROGRESS,
            EventKind::Log => EVENT_LOG,
            EventKind::ItemCompleted => EVENT_ITEM_COMPLETED,
            EventKind::ItemFailed => EVENT_ITEM_FAILED,
            EventKind::Terminal => EVENT_TERMINAL,
        }
    }

    /// Log events are diagnostic and may be dropped under overload.
    /// Every other kind carries job state and must be delivered.
    pub fn is_droppable(self) -> bool {
        matches!(self, EventKind::Log)
    }
}
