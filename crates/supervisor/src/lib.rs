//! Worker process supervision for gridlab analysis jobs.
//!
//! [`Supervisor`] launches one OS process per job, enforces at most one
//! active job per `(class, scenario_key)`, turns worker output into
//! progress events on the [`gridlab_events::ProgressBus`] and drives every
//! job to exactly one terminal status.

pub mod config;
pub mod error;
pub mod input;
mod process;
pub mod registry;
pub mod supervisor;

pub use config::{SupervisorConfig, WorkerCommand};
pub use error::SupervisorError;
pub use registry::{JobFilter, JobRegistry, JobSnapshot};
pub use supervisor::Supervisor;
