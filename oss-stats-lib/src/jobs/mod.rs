//! Job runner and scheduler.
//!
//! The [`Engine`] runs one named job to completion under a run-level timeout and reports a
//! serializable [`JobSummary`]. The [`Scheduler`] fires each job on its own cadence; runs of
//! the same job never overlap, and a run that overshoots its period skips the missed ticks.

mod engine;
mod scheduler;

pub use engine::{Engine, JobKind, JobSummary};
pub use scheduler::Scheduler;
