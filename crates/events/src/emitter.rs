//! Per-job event producer.
//!
//! A [`JobEmitter`] stamps events with the job's id, class and sequence
//! number and publishes them on the class channel. It is shared between
//! the tasks that read a worker's stdout and stderr and the task that
//! reaps the process, so sequence assignment and publication happen
//! under one lock: the order of `seq` is the order consumers observe.
//!
//! After a terminal event has been emitted every further emit is
//! rejected, which keeps the terminal event unique and last.

use std::sync::Arc;

use gridlab_core::types::{FailureKind, JobClass, JobId, JobStatus};
use parking_lot::Mutex;

use crate::bus::ProgressChannel;
use crate::event::{EventPayload, ProgressEvent};

struct EmitterState {
    next_seq: u64,
    terminated: bool,
}

pub struct JobEmitter {
    job_id: JobId,
    class: JobClass,
    channel: Arc<ProgressChannel>,
    state: Mutex<EmitterState>,
}

impl JobEmitter {
    pub fn new(job_id: impl Into<JobId>, channel: Arc<ProgressChannel>) -> Self {
        Self {
            job_id: job_id.into(),
            class: channel.class(),
            channel,
            state: Mutex::new(EmitterState {
                next_seq: 0,
                terminated: false,
            }),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn class(&self) -> JobClass {
        self.class
    }

    /// Publish a non-terminal payload. Returns `false` once the job has
    /// terminated.
    pub fn emit(&self, payload: EventPayload) -> bool {
        let mut state = self.state.lock();
        if state.terminated {
            tracing::warn!(
                job_id = %self.job_id,
                kind = payload.kind().as_str(),
                "Event emitted after terminal event, discarding",
            );
            return false;
        }
        if matches!(payload, EventPayload::Terminal { .. }) {
            state.terminated = true;
        }

        let event = ProgressEvent::new(self.job_id.clone(), self.class, state.next_seq, payload);
        state.next_seq += 1;
        self.channel.publish(event);
        true
    }

    /// Publish the terminal event. Only the first call has any effect.
    pub fn terminate(
        &self,
        status: JobStatus,
        failure: Option<FailureKind>,
        error: Option<String>,
    ) -> bool {
        self.emit(EventPayload::Terminal {
            status,
            failure,
            error,
        })
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.state.lock().next_seq
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ProgressBus;
    use crate::event::LogStream;

    #[tokio::test]
    async fn assigns_consecutive_sequence_numbers() {
        let bus = ProgressBus::default();
        let sub = bus.subscribe(JobClass::Forecast);
        let emitter = JobEmitter::new("job-1", bus.channel(JobClass::Forecast));

        emitter.emit(EventPayload::Log {
            stream: LogStream::Stdout,
            line: "hello".into(),
        });
        emitter.emit(EventPayload::Progress {
            percent: 50.0,
            message: "half".into(),
        });
        emitter.terminate(JobStatus::Completed, None, None);

        let seqs: Vec<u64> = vec![
            sub.recv().await.unwrap().seq,
            sub.recv().await.unwrap().seq,
            sub.recv().await.unwrap().seq,
        ];
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(emitter.emitted(), 3);
    }

    #[tokio::test]
    async fn terminal_is_emitted_once_and_last() {
        let bus = ProgressBus::default();
        let sub = bus.subscribe(JobClass::Forecast);
        let emitter = JobEmitter::new("job-1", bus.channel(JobClass::Forecast));

        assert!(emitter.terminate(JobStatus::Cancelled, None, None));
        assert!(!emitter.terminate(
            JobStatus::Failed,
            Some(FailureKind::WorkerFailure),
            Some("late".into())
        ));
        assert!(!emitter.emit(EventPayload::Progress {
            percent: 99.0,
            message: String::new(),
        }));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.terminal_status(), Some(JobStatus::Cancelled));
        bus.close_all();
        assert!(sub.recv().await.is_none(), "nothing follows the terminal event");
    }
}
