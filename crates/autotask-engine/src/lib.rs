//! `autotask-engine` — the scheduling and execution core.
//!
//! # Overview
//!
//! Three pieces, leaf-first:
//!
//! - [`cron`] — pure recurrence calculator: cron expression + IANA zone
//!   + instant in, next UTC trigger instant out, DST-correct.
//! - [`executor::TaskExecutor`] — drives one execution attempt through
//!   its full lifecycle (`pending → running → success|failed`) and
//!   guarantees the record is finalized exactly once.
//! - [`engine::SchedulerEngine`] — the polling control loop that seeds
//!   and fires schedules, owned by a [`engine::SchedulerController`]
//!   with idempotent `start`/`stop`.

pub mod cron;
pub mod engine;
pub mod error;
pub mod executor;

pub use engine::{SchedulerController, SchedulerEngine};
pub use error::{EngineError, Result};
pub use executor::{InterpreterRunner, ScriptRunner, TaskExecutor};
