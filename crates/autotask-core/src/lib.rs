//! `autotask-core` — shared types, configuration, and capability traits.
//!
//! Everything the other autotask crates agree on lives here: the task /
//! schedule / execution data model, the layered config, and the trait
//! seams behind which the excluded collaborators (notification senders,
//! ML processors) are implemented elsewhere.

pub mod capability;
pub mod config;
pub mod error;
pub mod types;

pub use config::AutotaskConfig;
pub use error::{CoreError, Result};
pub use types::{
    ExecutionStatus, Schedule, ScriptType, Task, TaskExecution, TriggeredBy,
};
