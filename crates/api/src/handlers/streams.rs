//! Server-sent progress streams.
//!
//! Each connection owns one subscription on its job class channel. The
//! stream waits for the next event with the keep-alive interval as its
//! timeout: an idle interval produces a comment frame, an event produces
//! `event: <kind>` plus the event as JSON. The stream ends right after a
//! terminal event (of the requested job, or of the first job seen when
//! no job is requested) and when the bus shuts down. Dropping the
//! response drops the subscription, which unregisters its queue.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use gridlab_core::types::{JobClass, JobId};
use gridlab_events::{ProgressEvent, Recv, Subscription};
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Comment text of keep-alive frames.
pub const KEEP_ALIVE_COMMENT: &str = "keep-alive";

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Only forward events of this job.
    pub job_id: Option<JobId>,
}

/// GET /api/v1/streams/{job_class}
pub async fn stream_progress(
    State(state): State<AppState>,
    Path(job_class): Path<String>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let class: JobClass = job_class.parse()?;

    // Subscribe before looking at the job so its terminal event cannot
    // slip between the check and the subscription.
    let subscription = state.bus.subscribe(class);

    let mut finished = false;
    if let Some(job_id) = &query.job_id {
        let snapshot = state.supervisor.status(job_id)?;
        if snapshot.job_class != class {
            return Err(AppError::BadRequest(format!(
                "Job {job_id} belongs to class {}, not {class}",
                snapshot.job_class
            )));
        }
        finished = snapshot.status.is_terminal();
    }

    tracing::debug!(
        job_class = %class,
        job_id = ?query.job_id,
        finished,
        "Progress stream opened",
    );

    let stream = ProgressStream {
        subscription,
        job_id: query.job_id,
        keepalive: state.config.stream.keepalive(),
    };
    Ok(Sse::new(stream.into_stream(!finished)))
}

struct ProgressStream {
    subscription: Subscription,
    job_id: Option<JobId>,
    keepalive: Duration,
}

impl ProgressStream {
    fn wants(&self, event: &ProgressEvent) -> bool {
        self.job_id.as_ref().map_or(true, |id| *id == event.job_id)
    }

    /// Next frame, and whether the stream stays open after it.
    ///
    /// The keep-alive deadline runs from the previous frame; events of
    /// other jobs do not push it back.
    async fn next_frame(&self) -> Option<(Event, bool)> {
        let deadline = Instant::now() + self.keepalive;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.subscription.recv_timeout(remaining).await {
                Recv::Idle => return Some((Event::default().comment(KEEP_ALIVE_COMMENT), true)),
                Recv::Closed => return None,
                Recv::Event(event) if self.wants(&event) => {
                    return Some((event_frame(&event), !event.is_terminal()));
                }
                Recv::Event(_) => continue,
            }
        }
    }

    fn into_stream(self, open: bool) -> impl Stream<Item = Result<Event, Infallible>> {
        futures::stream::unfold(open.then_some(self), |state| async move {
            let state = state?;
            let (frame, keep_open) = state.next_frame().await?;
            Some((Ok(frame), keep_open.then_some(state)))
        })
    }
}

fn event_frame(event: &ProgressEvent) -> Event {
    let frame = Event::default().event(event.kind().as_str());
    match frame.json_data(event) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(job_id = %event.job_id, error = %e, "Failed to serialize progress event");
            Event::default().comment("unserializable event")
        }
    }
}
