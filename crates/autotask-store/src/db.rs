use rusqlite::Connection;

use crate::error::Result;

/// Initialise the autotask schema in `conn`.
///
/// Creates all tables (idempotent) plus an index on `(is_active,
/// next_run)` so the scheduler's poll query stays cheap with many
/// schedules.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT    NOT NULL PRIMARY KEY,
            name            TEXT    NOT NULL,
            script_type     TEXT    NOT NULL,
            script_content  TEXT    NOT NULL,
            is_enabled      INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS schedules (
            id              TEXT    NOT NULL PRIMARY KEY,
            task_id         TEXT    NOT NULL REFERENCES tasks(id),
            cron_expression TEXT    NOT NULL,
            timezone        TEXT    NOT NULL,
            is_active       INTEGER NOT NULL DEFAULT 1,
            next_run        TEXT,               -- RFC 3339 UTC or NULL (never evaluated)
            last_run        TEXT,               -- RFC 3339 UTC or NULL
            created_at      TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_schedules_active_next
            ON schedules (is_active, next_run);

        CREATE TABLE IF NOT EXISTS task_executions (
            id              TEXT    NOT NULL PRIMARY KEY,
            task_id         TEXT    NOT NULL REFERENCES tasks(id),
            triggered_by    TEXT    NOT NULL,
            status          TEXT    NOT NULL DEFAULT 'pending',
            exit_code       INTEGER,
            stdout          TEXT,
            stderr          TEXT,
            duration_ms     INTEGER,
            error_message   TEXT,
            created_at      TEXT    NOT NULL,
            completed_at    TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_executions_task
            ON task_executions (task_id, created_at);

        CREATE TABLE IF NOT EXISTS system_logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            level       TEXT    NOT NULL,
            component   TEXT    NOT NULL,
            message     TEXT    NOT NULL,
            detail      TEXT,               -- error text / stack trace
            metadata    TEXT,               -- opaque JSON
            created_at  TEXT    NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }
}
