//! Periodic maintenance spawned by `main` alongside the server.
//!
//! Loops run until their [`CancellationToken`] fires at shutdown.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod job_retention;
