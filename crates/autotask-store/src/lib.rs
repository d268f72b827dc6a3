//! `autotask-store` — SQLite persistence for tasks, schedules, and
//! execution records.
//!
//! The rest of the system talks to [`store::TaskStore`] and never sees
//! SQL. Every operation is an independent transaction; there is no
//! cross-call transactional scope, so callers must tolerate interleaving
//! updaters (next-run computation is idempotent for exactly this reason).

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{DueSchedule, TaskStore};
