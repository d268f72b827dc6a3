use thiserror::Error;

use crate::cron::CronError;
use autotask_store::StoreError;

/// Errors surfaced by the executor and scheduler loop.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No task with the given ID exists.
    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    /// The task exists but is disabled; no execution record is created.
    #[error("task is disabled: {id}")]
    TaskDisabled { id: String },

    /// The task already has an execution in flight; rejected before any
    /// record is created.
    #[error("task already has an execution in flight: {id}")]
    ExecutionOverlap { id: String },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Recurrence calculation failure.
    #[error(transparent)]
    Cron(#[from] CronError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
