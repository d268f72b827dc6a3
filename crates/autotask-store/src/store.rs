use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

use autotask_core::types::{
    ExecutionStatus, Schedule, ScriptType, Task, TaskExecution, TriggeredBy,
};

use crate::{
    db::init_db,
    error::{Result, StoreError},
};

/// A schedule joined with the fields of its (enabled) owning task, as
/// returned by the scheduler's poll query.
#[derive(Debug, Clone)]
pub struct DueSchedule {
    pub schedule_id: String,
    pub task_id: String,
    pub task_name: String,
    pub script_type: ScriptType,
    pub cron_expression: String,
    pub timezone: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
}

/// Narrow persistence interface consumed by the engine.
///
/// Thread-safe: the connection sits behind a `Mutex` and every method
/// takes the lock for the duration of one statement, so concurrent
/// short-lived checkouts from the executor and the scheduler loop
/// interleave safely.
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl TaskStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, used by tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    pub fn create_task(
        &self,
        name: &str,
        script_type: ScriptType,
        script_content: &str,
    ) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO tasks (id, name, script_type, script_content, is_enabled,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)",
            rusqlite::params![id, name, script_type.to_string(), script_content, now.to_rfc3339()],
        )?;
        info!(task_id = %id, %name, "task created");
        Ok(Task {
            id,
            name: name.to_string(),
            script_type,
            script_content: script_content.to_string(),
            is_enabled: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, script_type, script_content, is_enabled,
                    created_at, updated_at
             FROM tasks WHERE id = ?1",
            [task_id],
            task_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::TaskNotFound {
            id: task_id.to_string(),
        })?
    }

    pub fn set_task_enabled(&self, task_id: &str, enabled: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE tasks SET is_enabled = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![enabled, Utc::now().to_rfc3339(), task_id],
        )?;
        if n == 0 {
            return Err(StoreError::TaskNotFound {
                id: task_id.to_string(),
            });
        }
        info!(task_id = %task_id, enabled, "task enabled flag updated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Schedules
    // -----------------------------------------------------------------------

    /// Create a schedule with `next_run = NULL`; the scheduler loop seeds
    /// it on its first pass without executing.
    pub fn create_schedule(
        &self,
        task_id: &str,
        cron_expression: &str,
        timezone: &str,
    ) -> Result<Schedule> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO schedules (id, task_id, cron_expression, timezone,
                                    is_active, next_run, last_run, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, NULL, NULL, ?5)",
            rusqlite::params![id, task_id, cron_expression, timezone, now.to_rfc3339()],
        )?;
        info!(schedule_id = %id, task_id = %task_id, %cron_expression, "schedule created");
        Ok(Schedule {
            id,
            task_id: task_id.to_string(),
            cron_expression: cron_expression.to_string(),
            timezone: timezone.to_string(),
            is_active: true,
            next_run: None,
            last_run: None,
            created_at: now,
        })
    }

    pub fn get_schedule(&self, schedule_id: &str) -> Result<Schedule> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, task_id, cron_expression, timezone, is_active,
                    next_run, last_run, created_at
             FROM schedules WHERE id = ?1",
            [schedule_id],
            schedule_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::ScheduleNotFound {
            id: schedule_id.to_string(),
        })?
    }

    pub fn set_schedule_active(&self, schedule_id: &str, active: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE schedules SET is_active = ?1 WHERE id = ?2",
            rusqlite::params![active, schedule_id],
        )?;
        if n == 0 {
            return Err(StoreError::ScheduleNotFound {
                id: schedule_id.to_string(),
            });
        }
        Ok(())
    }

    /// All active schedules whose owning task is enabled, joined with the
    /// task fields the scheduler needs.
    pub fn get_active_schedules(&self) -> Result<Vec<DueSchedule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT s.id, s.task_id, t.name, t.script_type,
                    s.cron_expression, s.timezone, s.next_run, s.last_run
             FROM schedules s
             JOIN tasks t ON t.id = s.task_id
             WHERE s.is_active = 1 AND t.is_enabled = 1
             ORDER BY s.created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (schedule_id, task_id, task_name, st, cron_expression, timezone, next, last) =
                row?;
            out.push(DueSchedule {
                schedule_id,
                task_id,
                task_name,
                script_type: parse_enum::<ScriptType>("schedules", &st)?,
                cron_expression,
                timezone,
                next_run: next.as_deref().map(|s| parse_utc("schedules", s)).transpose()?,
                last_run: last.as_deref().map(|s| parse_utc("schedules", s)).transpose()?,
            });
        }
        Ok(out)
    }

    /// Persist a freshly computed `next_run` and stamp `last_run = now`.
    pub fn update_schedule_next_run(
        &self,
        schedule_id: &str,
        next_run: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE schedules SET next_run = ?1, last_run = ?2 WHERE id = ?3",
            rusqlite::params![next_run.to_rfc3339(), Utc::now().to_rfc3339(), schedule_id],
        )?;
        if n == 0 {
            return Err(StoreError::ScheduleNotFound {
                id: schedule_id.to_string(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Create an execution record in `pending` and return its id.
    pub fn create_execution(&self, task_id: &str, triggered_by: TriggeredBy) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO task_executions (id, task_id, triggered_by, status, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4)",
            rusqlite::params![id, task_id, triggered_by.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(id)
    }

    pub fn update_execution_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE task_executions SET status = ?1 WHERE id = ?2",
            rusqlite::params![status.to_string(), execution_id],
        )?;
        if n == 0 {
            return Err(StoreError::ExecutionNotFound {
                id: execution_id.to_string(),
            });
        }
        Ok(())
    }

    /// Finalize an execution with a terminal status and captured output.
    /// This is the only path that stamps `completed_at`.
    #[allow(clippy::too_many_arguments)]
    pub fn complete_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        exit_code: i32,
        stdout: &str,
        stderr: &str,
        duration_ms: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE task_executions
             SET status = ?1, exit_code = ?2, stdout = ?3, stderr = ?4,
                 duration_ms = ?5, error_message = ?6, completed_at = ?7
             WHERE id = ?8",
            rusqlite::params![
                status.to_string(),
                exit_code,
                stdout,
                stderr,
                duration_ms,
                error_message,
                Utc::now().to_rfc3339(),
                execution_id
            ],
        )?;
        if n == 0 {
            return Err(StoreError::ExecutionNotFound {
                id: execution_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn get_execution(&self, execution_id: &str) -> Result<TaskExecution> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, task_id, triggered_by, status, exit_code, stdout, stderr,
                    duration_ms, error_message, created_at, completed_at
             FROM task_executions WHERE id = ?1",
            [execution_id],
            execution_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::ExecutionNotFound {
            id: execution_id.to_string(),
        })?
    }

    /// Most recent executions of a task, newest first.
    pub fn list_executions(&self, task_id: &str, limit: u32) -> Result<Vec<TaskExecution>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, task_id, triggered_by, status, exit_code, stdout, stderr,
                    duration_ms, error_message, created_at, completed_at
             FROM task_executions WHERE task_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![task_id, limit], execution_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row??);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // System log
    // -----------------------------------------------------------------------

    /// Record an operational event. Best effort from the caller's point of
    /// view; the engine never aborts work because logging failed.
    pub fn log_system_event(
        &self,
        level: &str,
        component: &str,
        message: &str,
        detail: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO system_logs (level, component, message, detail, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                level,
                component,
                message,
                detail,
                metadata.map(|m| m.to_string()),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_utc(table: &'static str, s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            detail: format!("bad timestamp {s:?}: {e}"),
        })
}

fn parse_enum<T: std::str::FromStr>(table: &'static str, s: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    s.parse().map_err(|e| StoreError::Corrupt {
        table,
        detail: format!("bad enum value {s:?}: {e}"),
    })
}

// The row closures return `rusqlite::Result<Result<T>>` so column access
// errors surface as rusqlite errors while decode errors keep their own type.

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Task>> {
    let script_type: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok((|| {
        Ok(Task {
            id: row.get(0)?,
            name: row.get(1)?,
            script_type: parse_enum("tasks", &script_type)?,
            script_content: row.get(3)?,
            is_enabled: row.get(4)?,
            created_at: parse_utc("tasks", &created_at)?,
            updated_at: parse_utc("tasks", &updated_at)?,
        })
    })())
}

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Schedule>> {
    let next_run: Option<String> = row.get(5)?;
    let last_run: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    Ok((|| {
        Ok(Schedule {
            id: row.get(0)?,
            task_id: row.get(1)?,
            cron_expression: row.get(2)?,
            timezone: row.get(3)?,
            is_active: row.get(4)?,
            next_run: next_run
                .as_deref()
                .map(|s| parse_utc("schedules", s))
                .transpose()?,
            last_run: last_run
                .as_deref()
                .map(|s| parse_utc("schedules", s))
                .transpose()?,
            created_at: parse_utc("schedules", &created_at)?,
        })
    })())
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<Result<TaskExecution>> {
    let triggered_by: String = row.get(2)?;
    let status: String = row.get(3)?;
    let created_at: String = row.get(9)?;
    let completed_at: Option<String> = row.get(10)?;
    Ok((|| {
        Ok(TaskExecution {
            id: row.get(0)?,
            task_id: row.get(1)?,
            triggered_by: parse_enum("task_executions", &triggered_by)?,
            status: parse_enum("task_executions", &status)?,
            exit_code: row.get(4)?,
            stdout: row.get(5)?,
            stderr: row.get(6)?,
            duration_ms: row.get(7)?,
            error_message: row.get(8)?,
            created_at: parse_utc("task_executions", &created_at)?,
            completed_at: completed_at
                .as_deref()
                .map(|s| parse_utc("task_executions", s))
                .transpose()?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TaskStore {
        TaskStore::open_in_memory().unwrap()
    }

    #[test]
    fn task_roundtrip() {
        let store = store();
        let task = store
            .create_task("hello", ScriptType::Bash, "echo hi")
            .unwrap();
        let loaded = store.get_task(&task.id).unwrap();
        assert_eq!(loaded.name, "hello");
        assert_eq!(loaded.script_type, ScriptType::Bash);
        assert!(loaded.is_enabled);
    }

    #[test]
    fn unknown_task_is_not_found() {
        let store = store();
        assert!(matches!(
            store.get_task("nope"),
            Err(StoreError::TaskNotFound { .. })
        ));
    }

    #[test]
    fn schedule_starts_unseeded() {
        let store = store();
        let task = store.create_task("t", ScriptType::Python, "pass").unwrap();
        let sched = store
            .create_schedule(&task.id, "0 * * * *", "UTC")
            .unwrap();
        assert!(sched.next_run.is_none());
        assert!(sched.last_run.is_none());
    }

    #[test]
    fn update_next_run_stamps_last_run() {
        let store = store();
        let task = store.create_task("t", ScriptType::Python, "pass").unwrap();
        let sched = store
            .create_schedule(&task.id, "0 * * * *", "UTC")
            .unwrap();

        let next = Utc::now() + chrono::Duration::hours(1);
        store.update_schedule_next_run(&sched.id, next).unwrap();

        let loaded = store.get_schedule(&sched.id).unwrap();
        assert_eq!(
            loaded.next_run.unwrap().timestamp(),
            next.timestamp()
        );
        assert!(loaded.last_run.is_some());
    }

    #[test]
    fn active_schedules_excludes_disabled_tasks() {
        let store = store();
        let enabled = store.create_task("on", ScriptType::Bash, "true").unwrap();
        let disabled = store.create_task("off", ScriptType::Bash, "true").unwrap();
        store.create_schedule(&enabled.id, "* * * * *", "UTC").unwrap();
        store.create_schedule(&disabled.id, "* * * * *", "UTC").unwrap();
        store.set_task_enabled(&disabled.id, false).unwrap();

        let due = store.get_active_schedules().unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].task_id, enabled.id);
    }

    #[test]
    fn active_schedules_excludes_inactive_schedules() {
        let store = store();
        let task = store.create_task("t", ScriptType::Bash, "true").unwrap();
        let sched = store.create_schedule(&task.id, "* * * * *", "UTC").unwrap();
        store.set_schedule_active(&sched.id, false).unwrap();
        assert!(store.get_active_schedules().unwrap().is_empty());
    }

    #[test]
    fn execution_lifecycle() {
        let store = store();
        let task = store.create_task("t", ScriptType::Bash, "true").unwrap();
        let exec_id = store
            .create_execution(&task.id, TriggeredBy::Manual)
            .unwrap();

        let exec = store.get_execution(&exec_id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert!(exec.completed_at.is_none());

        store
            .update_execution_status(&exec_id, ExecutionStatus::Running)
            .unwrap();
        store
            .complete_execution(&exec_id, ExecutionStatus::Success, 0, "out", "", 12, None)
            .unwrap();

        let exec = store.get_execution(&exec_id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.exit_code, Some(0));
        assert_eq!(exec.stdout.as_deref(), Some("out"));
        assert_eq!(exec.duration_ms, Some(12));
        assert!(exec.completed_at.is_some());
    }

    #[test]
    fn list_executions_newest_first() {
        let store = store();
        let task = store.create_task("t", ScriptType::Bash, "true").unwrap();
        let first = store.create_execution(&task.id, TriggeredBy::Manual).unwrap();
        let second = store
            .create_execution(&task.id, TriggeredBy::Schedule)
            .unwrap();

        let all = store.list_executions(&task.id, 10).unwrap();
        assert_eq!(all.len(), 2);
        // Same-second inserts keep stable relative order from the sort key.
        let ids: Vec<_> = all.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&first.as_str()));
        assert!(ids.contains(&second.as_str()));
    }

    #[test]
    fn system_log_insert() {
        let store = store();
        store
            .log_system_event(
                "error",
                "scheduler",
                "boom",
                Some("trace"),
                Some(&serde_json::json!({"schedule_id": "abc"})),
            )
            .unwrap();
    }
}
