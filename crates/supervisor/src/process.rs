//! Worker process plumbing: output readers and termination.
//!
//! stdout carries the progress protocol; every line is either parsed into a
//! structured event or forwarded as a log line. stderr is forwarded as log
//! lines and its tail is kept so a failed job can report why it failed.

use std::collections::VecDeque;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use gridlab_core::protocol::{parse_line, ParsedLine, WorkerMessage};
use gridlab_events::{EventPayload, JobEmitter, LogStream};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;

/// Number of trailing stderr lines kept for failure reports.
pub const STDERR_TAIL_LINES: usize = 20;

/// Map a decoded worker message onto an event payload.
fn message_payload(message: WorkerMessage) -> EventPayload {
    match message {
        WorkerMessage::Progress { percent, message } => EventPayload::Progress { percent, message },
        WorkerMessage::ItemCompleted { item, detail } => EventPayload::ItemCompleted { item, detail },
        WorkerMessage::ItemFailed { item, error } => EventPayload::ItemFailed { item, error },
    }
}

/// Translate one stdout line into an event.
pub(crate) fn stdout_payload(job_id: &str, line: String) -> EventPayload {
    match parse_line(&line) {
        ParsedLine::Message(message) => message_payload(message),
        ParsedLine::Plain => EventPayload::Log {
            stream: LogStream::Stdout,
            line,
        },
        ParsedLine::Malformed(reason) => {
            tracing::debug!(job_id, %reason, "Malformed progress line forwarded as log");
            EventPayload::Log {
                stream: LogStream::Stdout,
                line,
            }
        }
    }
}

/// Read `stream` line by line until end of file.
///
/// Invalid UTF-8 is replaced rather than treated as an error so a worker
/// printing binary garbage cannot stall its own pipe.
async fn for_each_line<R, F>(stream: R, job_id: &str, mut f: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                f(line.trim_end_matches(['\r', '\n']).to_string());
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Worker output read failed");
                break;
            }
        }
    }
}

/// Forward worker stdout to the job's emitter.
pub(crate) async fn read_stdout<R>(stream: R, emitter: Arc<JobEmitter>)
where
    R: AsyncRead + Unpin,
{
    let job_id = emitter.job_id().to_string();
    for_each_line(stream, &job_id, |line| {
        emitter.emit(stdout_payload(&job_id, line));
    })
    .await;
}

/// Forward worker stderr to the job's emitter and return its tail.
pub(crate) async fn read_stderr<R>(stream: R, emitter: Arc<JobEmitter>) -> String
where
    R: AsyncRead + Unpin,
{
    let job_id = emitter.job_id().to_string();
    let mut tail = StderrTail::new(STDERR_TAIL_LINES);
    for_each_line(stream, &job_id, |line| {
        tail.push(&line);
        emitter.emit(EventPayload::Log {
            stream: LogStream::Stderr,
            line,
        });
    })
    .await;
    tail.into_string()
}

/// Bounded buffer of the last non-blank stderr lines.
pub(crate) struct StderrTail {
    lines: VecDeque<String>,
    max_lines: usize,
}

impl StderrTail {
    pub(crate) fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_lines),
            max_lines: max_lines.max(1),
        }
    }

    pub(crate) fn push(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        if self.lines.len() == self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub(crate) fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}

// ---------------------------------------------------------------------------
// Termination
// ---------------------------------------------------------------------------

/// Ask the worker to stop, then kill it if it is still running after
/// `grace`. Returns the reaped exit status.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    send_terminate(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(
                pid = ?child.id(),
                grace_secs = grace.as_secs_f64(),
                "Worker ignored termination request, killing",
            );
            send_kill(child);
            child.wait().await
        }
    }
}

/// SIGTERM the worker's process group so helpers it launched stop too.
#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGTERM);
    } else {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn send_kill(child: &mut Child) {
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGKILL);
    }
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn send_kill(child: &mut Child) {
    let _ = child.start_kill();
}

/// Workers are spawned as process group leaders, so the group id is the pid.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        tracing::debug!(
            pid,
            signal,
            error = %io::Error::last_os_error(),
            "Signal delivery failed",
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
