//! In-process periodic task scheduler
//!
//! Runs any number of recurring tasks, each on its own cadence, and never lets
//! a task's work overlap with itself: a tick that finds its task still busy is
//! skipped, not queued.

pub mod config;
pub mod error;
pub mod log_appender;
pub mod scheduler;

pub use config::{SchedulerConfig, Settings, TaskDefinition, WorkFailurePolicy};
pub use error::SchedulerError;
pub use scheduler::{PeriodicScheduler, TaskId, TaskSnapshot};
