use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No task with the given ID exists.
    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    /// No schedule with the given ID exists.
    #[error("schedule not found: {id}")]
    ScheduleNotFound { id: String },

    /// No execution with the given ID exists.
    #[error("execution not found: {id}")]
    ExecutionNotFound { id: String },

    /// A stored value could not be decoded (bad timestamp or enum string).
    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
