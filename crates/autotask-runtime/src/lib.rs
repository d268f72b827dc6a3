//! `autotask-runtime` — maps a script's declared runtime to an external
//! interpreter invocation and runs it with a bounded wall-clock timeout.
//!
//! The crate has two layers:
//!
//! - [`runner`] executes one already-built command, capturing stdout,
//!   stderr, and the exit code, killing the child on timeout.
//! - [`dispatch`] knows, per [`ScriptType`](autotask_core::ScriptType)
//!   variant, which interpreter to invoke and how to stage the script
//!   content as a scoped temporary file that is removed on every exit
//!   path.
//!
//! Safe to invoke concurrently: staged artifacts are named by task id,
//! execution id, and a random suffix, so concurrent executions never
//! collide.

pub mod dispatch;
pub mod error;
pub mod runner;
pub mod stage;
pub mod types;

pub use dispatch::run_script;
pub use error::{Result, RuntimeError};
pub use types::ScriptOutput;
