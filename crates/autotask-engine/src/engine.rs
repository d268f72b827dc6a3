//! Polling scheduler loop and its start/stop controller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use autotask_core::config::SHUTDOWN_GRACE_SECS;
use autotask_core::types::TriggeredBy;
use autotask_store::{DueSchedule, TaskStore};

use crate::cron;
use crate::error::EngineError;
use crate::executor::TaskExecutor;

/// The polling loop. Every tick it loads active schedules for enabled
/// tasks, seeds any that have never been evaluated, and fires the ones
/// whose stored `next_run` has passed.
///
/// A failure in one schedule is logged and never stops the loop or the
/// rest of the batch.
pub struct SchedulerEngine {
    store: Arc<TaskStore>,
    executor: Arc<TaskExecutor>,
    check_interval: Duration,
}

impl SchedulerEngine {
    pub fn new(store: Arc<TaskStore>, executor: Arc<TaskExecutor>, check_interval: Duration) -> Self {
        Self {
            store,
            executor,
            check_interval,
        }
    }

    /// Run until the shutdown signal flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.check_interval.as_secs(), "scheduler loop started");
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler loop stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over the active schedules. All due comparisons within a
    /// pass use a single `now` snapshot.
    pub async fn tick(&self) {
        let schedules = match self.store.get_active_schedules() {
            Ok(schedules) => schedules,
            Err(e) => {
                error!("could not load active schedules: {e}");
                let _ = self.store.log_system_event(
                    "error",
                    "scheduler",
                    "could not load active schedules",
                    Some(&e.to_string()),
                    None,
                );
                return;
            }
        };

        let now = Utc::now();
        debug!(count = schedules.len(), "scheduler tick");
        for schedule in &schedules {
            if let Err(e) = self.process_schedule(schedule, now).await {
                error!(schedule_id = %schedule.schedule_id, "schedule processing failed: {e}");
                let _ = self.store.log_system_event(
                    "error",
                    "scheduler",
                    &format!("schedule processing failed: {}", schedule.task_name),
                    Some(&e.to_string()),
                    Some(&serde_json::json!({ "schedule_id": schedule.schedule_id })),
                );
            }
        }
    }

    async fn process_schedule(
        &self,
        schedule: &DueSchedule,
        now: DateTime<Utc>,
    ) -> crate::error::Result<()> {
        let next = match schedule.next_run {
            // Never evaluated. Seed the first trigger instant and wait
            // for a later tick; seeding never fires.
            None => {
                let next = self.next_run_or_fallback(schedule, now);
                self.store.update_schedule_next_run(&schedule.schedule_id, next)?;
                info!(
                    schedule_id = %schedule.schedule_id,
                    task = %schedule.task_name,
                    %next,
                    "schedule seeded"
                );
                return Ok(());
            }
            Some(next) => next,
        };

        if now < next {
            return Ok(());
        }

        info!(
            schedule_id = %schedule.schedule_id,
            task = %schedule.task_name,
            due = %next,
            "schedule due, triggering"
        );
        match self
            .executor
            .execute(&schedule.task_id, TriggeredBy::Schedule)
            .await
        {
            Ok(_) => {}
            // A previous attempt is still in flight. Skip this trigger
            // and advance past it rather than re-firing next tick.
            Err(EngineError::ExecutionOverlap { id }) => {
                warn!(task_id = %id, "previous execution still running, skipping trigger");
            }
            Err(e) => {
                error!(task_id = %schedule.task_id, "scheduled execution failed: {e}");
                let _ = self.store.log_system_event(
                    "error",
                    "scheduler",
                    &format!("scheduled execution failed: {}", schedule.task_name),
                    Some(&e.to_string()),
                    Some(&serde_json::json!({ "task_id": schedule.task_id })),
                );
            }
        }

        // Advance from now, not from the missed instant, so a backlog of
        // missed triggers collapses into one.
        let next = self.next_run_or_fallback(schedule, now);
        self.store.update_schedule_next_run(&schedule.schedule_id, next)?;
        Ok(())
    }

    /// Next trigger instant, or `now + 1h` when the stored expression or
    /// timezone cannot be evaluated. The fallback keeps a broken
    /// schedule visible instead of silently retiring it.
    fn next_run_or_fallback(&self, schedule: &DueSchedule, now: DateTime<Utc>) -> DateTime<Utc> {
        match cron::next_run(&schedule.cron_expression, &schedule.timezone, now) {
            Ok(next) => next,
            Err(e) => {
                warn!(
                    schedule_id = %schedule.schedule_id,
                    expr = %schedule.cron_expression,
                    "recurrence calculation failed, retrying in 1h: {e}"
                );
                let _ = self.store.log_system_event(
                    "warning",
                    "scheduler",
                    &format!("recurrence calculation failed: {}", schedule.task_name),
                    Some(&e.to_string()),
                    Some(&serde_json::json!({
                        "schedule_id": schedule.schedule_id,
                        "cron_expression": schedule.cron_expression,
                    })),
                );
                now + ChronoDuration::hours(1)
            }
        }
    }
}

/// Owns the scheduler task and its shutdown channel.
///
/// `start` is idempotent and `stop` waits for the loop to drain, bounded
/// by [`SHUTDOWN_GRACE_SECS`].
pub struct SchedulerController {
    engine: Option<SchedulerEngine>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerController {
    pub fn new(engine: SchedulerEngine) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine: Some(engine),
            shutdown_tx,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the loop. A second call while running (or after the engine
    /// has been consumed) is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("scheduler already running");
            return;
        }
        let Some(engine) = self.engine.take() else {
            warn!("scheduler was already started and stopped");
            return;
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.handle = Some(tokio::spawn(engine.run(shutdown_rx)));
        info!("scheduler started");
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(true);
        match tokio::time::timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), handle).await {
            Ok(_) => info!("scheduler stopped"),
            Err(_) => warn!("scheduler did not stop within {SHUTDOWN_GRACE_SECS}s, abandoning"),
        }
    }
}
