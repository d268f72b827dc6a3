//! Task executor — drives one execution attempt through its lifecycle.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, warn};

use autotask_core::capability::Notifier;
use autotask_core::types::{ExecutionStatus, ScriptType, Task, TriggeredBy};
use autotask_runtime::{run_script, ScriptOutput};
use autotask_store::{StoreError, TaskStore};

use crate::error::{EngineError, Result};

/// Seam between the executor and the process-running machinery, so the
/// lifecycle logic can be exercised without spawning interpreters.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(
        &self,
        script_type: ScriptType,
        script_content: &str,
        task_id: &str,
        execution_id: &str,
    ) -> autotask_runtime::Result<ScriptOutput>;
}

/// Production runner: stages the script and invokes the real interpreter
/// with the fixed timeout.
pub struct InterpreterRunner;

#[async_trait]
impl ScriptRunner for InterpreterRunner {
    async fn run(
        &self,
        script_type: ScriptType,
        script_content: &str,
        task_id: &str,
        execution_id: &str,
    ) -> autotask_runtime::Result<ScriptOutput> {
        run_script(script_type, script_content, task_id, execution_id).await
    }
}

/// Orchestrates one execution: loads the task, creates the execution
/// record, dispatches to the runtime, classifies the result, and
/// finalizes the record exactly once.
///
/// Safe to share across the scheduler loop and manual-trigger callers.
/// Executions of *distinct* tasks run concurrently; a second execution
/// of the *same* task is rejected while one is in flight.
pub struct TaskExecutor {
    store: Arc<TaskStore>,
    runner: Arc<dyn ScriptRunner>,
    notifier: Option<Arc<dyn Notifier>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl TaskExecutor {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self {
            store,
            runner: Arc::new(InterpreterRunner),
            notifier: None,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Replace the script runner (tests, alternative sandboxes).
    pub fn with_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Attach a notifier that receives every finalized execution.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Execute a task once and return the finalized execution's id.
    ///
    /// Returns without creating any execution record when the task does
    /// not exist, is disabled, or already has an execution in flight.
    /// Once a record exists it always reaches a terminal status on this
    /// path, even when the runtime fails internally.
    pub async fn execute(&self, task_id: &str, triggered_by: TriggeredBy) -> Result<String> {
        let task = self.store.get_task(task_id).map_err(|e| match e {
            StoreError::TaskNotFound { id } => EngineError::TaskNotFound { id },
            other => EngineError::Store(other),
        })?;

        if !task.is_enabled {
            warn!(task_id = %task.id, name = %task.name, "task is disabled; not executing");
            return Err(EngineError::TaskDisabled { id: task.id });
        }

        let _lease = InFlightLease::acquire(&self.in_flight, &task.id)?;
        self.run_attempt(&task, triggered_by).await
    }

    async fn run_attempt(&self, task: &Task, triggered_by: TriggeredBy) -> Result<String> {
        let execution_id = self.store.create_execution(&task.id, triggered_by)?;
        info!(
            execution_id = %execution_id,
            task_id = %task.id,
            name = %task.name,
            %triggered_by,
            "starting execution"
        );
        self.store
            .update_execution_status(&execution_id, ExecutionStatus::Running)?;

        let start = Instant::now();
        let outcome = self
            .runner
            .run(task.script_type, &task.script_content, &task.id, &execution_id)
            .await;
        let duration_ms = start.elapsed().as_millis() as i64;

        match outcome {
            Ok(output) => {
                let status = if output.success() {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::Failed
                };
                let error_message = (!output.success()).then(|| output.stderr.clone());
                self.store.complete_execution(
                    &execution_id,
                    status,
                    output.exit_code,
                    &output.stdout,
                    &output.stderr,
                    duration_ms,
                    error_message.as_deref(),
                )?;
                info!(
                    execution_id = %execution_id,
                    name = %task.name,
                    %status,
                    duration_ms,
                    "execution finished"
                );
            }
            Err(e) => {
                // Timeout, missing interpreter, platform restriction, or
                // staging failure — the record still gets finalized.
                let message = e.to_string();
                self.store.complete_execution(
                    &execution_id,
                    ExecutionStatus::Failed,
                    -1,
                    "",
                    &message,
                    duration_ms,
                    Some(&message),
                )?;
                error!(
                    execution_id = %execution_id,
                    name = %task.name,
                    "execution failed: {message}"
                );
                let _ = self.store.log_system_event(
                    "error",
                    "task_executor",
                    &format!("task execution failed: {}", task.name),
                    Some(&message),
                    Some(&serde_json::json!({
                        "task_id": task.id,
                        "execution_id": execution_id,
                    })),
                );
            }
        }

        self.notify(&execution_id).await;
        Ok(execution_id)
    }

    /// Deliver the finalized record to the notifier, if one is attached.
    /// Delivery failures are logged and never propagated.
    async fn notify(&self, execution_id: &str) {
        let Some(notifier) = &self.notifier else { return };
        match self.store.get_execution(execution_id) {
            Ok(execution) => {
                if let Err(e) = notifier.notify(&execution).await {
                    warn!(execution_id = %execution_id, "notification failed: {e}");
                }
            }
            Err(e) => warn!(execution_id = %execution_id, "could not load execution for notification: {e}"),
        }
    }
}

/// Per-task mutual exclusion for the duration of one attempt. Dropping
/// the lease releases the slot on every exit path.
struct InFlightLease {
    set: Arc<Mutex<HashSet<String>>>,
    task_id: String,
}

impl InFlightLease {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, task_id: &str) -> Result<Self> {
        let mut guard = set.lock().unwrap();
        if !guard.insert(task_id.to_string()) {
            return Err(EngineError::ExecutionOverlap {
                id: task_id.to_string(),
            });
        }
        Ok(Self {
            set: Arc::clone(set),
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for InFlightLease {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotask_core::types::TaskExecution;
    use autotask_runtime::RuntimeError;

    fn store() -> Arc<TaskStore> {
        Arc::new(TaskStore::open_in_memory().unwrap())
    }

    /// Runner that never touches a real interpreter.
    struct FakeRunner {
        result: fn() -> autotask_runtime::Result<ScriptOutput>,
    }

    #[async_trait]
    impl ScriptRunner for FakeRunner {
        async fn run(
            &self,
            _script_type: ScriptType,
            _content: &str,
            _task_id: &str,
            _execution_id: &str,
        ) -> autotask_runtime::Result<ScriptOutput> {
            (self.result)()
        }
    }

    /// Runner that parks long enough for a second trigger to race it.
    struct SlowRunner;

    #[async_trait]
    impl ScriptRunner for SlowRunner {
        async fn run(
            &self,
            _script_type: ScriptType,
            _content: &str,
            _task_id: &str,
            _execution_id: &str,
        ) -> autotask_runtime::Result<ScriptOutput> {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            Ok(ScriptOutput { exit_code: 0, stdout: String::new(), stderr: String::new() })
        }
    }

    #[tokio::test]
    async fn unknown_task_creates_no_record() {
        let store = store();
        let executor = TaskExecutor::new(Arc::clone(&store));
        let err = executor.execute("missing", TriggeredBy::Manual).await.unwrap_err();
        assert!(matches!(err, EngineError::TaskNotFound { .. }));
    }

    #[tokio::test]
    async fn disabled_task_creates_no_record() {
        let store = store();
        let task = store.create_task("t", ScriptType::Bash, "true").unwrap();
        store.set_task_enabled(&task.id, false).unwrap();

        let executor = TaskExecutor::new(Arc::clone(&store));
        let err = executor.execute(&task.id, TriggeredBy::Manual).await.unwrap_err();
        assert!(matches!(err, EngineError::TaskDisabled { .. }));
        assert!(store.list_executions(&task.id, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_exit_finalizes_as_success() {
        let store = store();
        let task = store.create_task("t", ScriptType::Bash, "echo hi").unwrap();
        let executor = TaskExecutor::new(Arc::clone(&store)).with_runner(Arc::new(FakeRunner {
            result: || Ok(ScriptOutput {
                exit_code: 0,
                stdout: "hi\n".into(),
                stderr: String::new(),
            }),
        }));

        let exec_id = executor.execute(&task.id, TriggeredBy::Manual).await.unwrap();
        let exec = store.get_execution(&exec_id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.exit_code, Some(0));
        assert_eq!(exec.stdout.as_deref(), Some("hi\n"));
        assert!(exec.error_message.is_none());
        assert!(exec.completed_at.is_some());
    }

    #[tokio::test]
    async fn nonzero_exit_finalizes_as_failed_with_stderr_message() {
        let store = store();
        let task = store.create_task("t", ScriptType::Bash, "exit 5").unwrap();
        let executor = TaskExecutor::new(Arc::clone(&store)).with_runner(Arc::new(FakeRunner {
            result: || Ok(ScriptOutput {
                exit_code: 5,
                stdout: String::new(),
                stderr: "boom\n".into(),
            }),
        }));

        let exec_id = executor.execute(&task.id, TriggeredBy::Schedule).await.unwrap();
        let exec = store.get_execution(&exec_id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.exit_code, Some(5));
        assert_eq!(exec.error_message.as_deref(), Some("boom\n"));
        assert_eq!(exec.triggered_by, TriggeredBy::Schedule);
    }

    #[tokio::test]
    async fn runtime_error_still_finalizes_the_record() {
        let store = store();
        let task = store.create_task("t", ScriptType::Lua, "print(1)").unwrap();
        let executor = TaskExecutor::new(Arc::clone(&store)).with_runner(Arc::new(FakeRunner {
            result: || Err(RuntimeError::InterpreterMissing {
                interpreter: "lua".into(),
            }),
        }));

        let exec_id = executor.execute(&task.id, TriggeredBy::Manual).await.unwrap();
        let exec = store.get_execution(&exec_id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.exit_code, Some(-1));
        assert!(exec.error_message.unwrap().contains("interpreter not found"));
    }

    #[tokio::test]
    async fn timeout_produces_a_distinguishable_message() {
        let store = store();
        let task = store.create_task("t", ScriptType::Python, "sleep").unwrap();
        let executor = TaskExecutor::new(Arc::clone(&store)).with_runner(Arc::new(FakeRunner {
            result: || Err(RuntimeError::Timeout { secs: 300 }),
        }));

        let exec_id = executor.execute(&task.id, TriggeredBy::Manual).await.unwrap();
        let exec = store.get_execution(&exec_id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.exit_code, Some(-1));
        assert!(exec.error_message.unwrap().contains("timed out after 300s"));
    }

    #[tokio::test]
    async fn concurrent_execution_of_same_task_is_rejected() {
        let store = store();
        let task = store.create_task("t", ScriptType::Bash, "true").unwrap();
        let executor = Arc::new(
            TaskExecutor::new(Arc::clone(&store)).with_runner(Arc::new(SlowRunner)),
        );

        let first = {
            let executor = Arc::clone(&executor);
            let id = task.id.clone();
            tokio::spawn(async move { executor.execute(&id, TriggeredBy::Schedule).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let second = executor.execute(&task.id, TriggeredBy::Manual).await;
        assert!(matches!(second, Err(EngineError::ExecutionOverlap { .. })));

        first.await.unwrap().unwrap();
        // Exactly one record, and the lease is released afterwards.
        assert_eq!(store.list_executions(&task.id, 10).unwrap().len(), 1);
        executor.execute(&task.id, TriggeredBy::Manual).await.unwrap();
    }

    #[tokio::test]
    async fn notifier_receives_finalized_execution() {
        struct Recorder(Mutex<Vec<TaskExecution>>);

        #[async_trait]
        impl Notifier for Recorder {
            async fn notify(&self, execution: &TaskExecution) -> std::result::Result<(), String> {
                self.0.lock().unwrap().push(execution.clone());
                Ok(())
            }
        }

        let store = store();
        let task = store.create_task("t", ScriptType::Bash, "true").unwrap();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let executor = TaskExecutor::new(Arc::clone(&store))
            .with_runner(Arc::new(FakeRunner {
                result: || Ok(ScriptOutput {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                }),
            }))
            .with_notifier(Arc::clone(&recorder) as Arc<dyn Notifier>);

        executor.execute(&task.id, TriggeredBy::Manual).await.unwrap();
        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].status.is_terminal());
    }
}
