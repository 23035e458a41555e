//! Domain types shared by every gridlab crate.
//!
//! Holds the job vocabulary ([`types::JobClass`], [`types::JobStatus`]),
//! the progress event kinds, the worker output protocol parser and the
//! shared [`error::CoreError`]. This crate has no internal dependencies.

pub mod error;
pub mod job;
pub mod job_events;
pub mod protocol;
pub mod types;
