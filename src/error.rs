use std::time::Duration;

use thiserror::Error;

use crate::scheduler::TaskId;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Task {0} already exists")]
    RegistrationConflict(TaskId),

    #[error("Task {0} does not exist")]
    UnknownTask(TaskId),

    #[error("Task {id} rejected: interval must be positive, got {interval:?}")]
    InvalidInterval { id: TaskId, interval: Duration },

    #[error("Task {id} failed: {source:#}")]
    WorkFailed {
        id: TaskId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Task {id} panicked: {message}")]
    WorkPanicked { id: TaskId, message: String },

    #[error("Task {id} was aborted before completing")]
    WorkAborted { id: TaskId },

    #[error("No tokio runtime available to drive task clocks")]
    NoRuntime,
}

impl SchedulerError {
    /// Task the error refers to, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::RegistrationConflict(id) | Self::UnknownTask(id) => Some(*id),
            Self::InvalidInterval { id, .. }
            | Self::WorkFailed { id, .. }
            | Self::WorkPanicked { id, .. }
            | Self::WorkAborted { id } => Some(*id),
            Self::NoRuntime => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::RegistrationConflict(7);
        assert_eq!(err.to_string(), "Task 7 already exists");

        let err = SchedulerError::UnknownTask(3);
        assert_eq!(err.to_string(), "Task 3 does not exist");
    }

    #[test]
    fn test_work_failure_keeps_source() {
        let err = SchedulerError::WorkFailed {
            id: 1,
            source: anyhow::anyhow!("device unreachable"),
        };
        assert!(err.to_string().contains("device unreachable"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_task_id() {
        assert_eq!(SchedulerError::UnknownTask(5).task_id(), Some(5));
        assert_eq!(
            SchedulerError::WorkPanicked { id: 2, message: "boom".into() }.task_id(),
            Some(2)
        );
        assert_eq!(SchedulerError::NoRuntime.task_id(), None);
    }
}
