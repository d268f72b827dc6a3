use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// ScriptType
// ---------------------------------------------------------------------------

/// The script runtime a task targets.
///
/// Closed set: adding a runtime means adding a variant here and a matching
/// interpreter arm in `autotask-runtime`, checked exhaustively at compile
/// time. An unrecognized name in stored data is a configuration error at
/// parse time, never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    Python,
    Bash,
    Powershell,
    Lua,
    Ruby,
}

impl ScriptType {
    pub const ALL: [ScriptType; 5] = [
        ScriptType::Python,
        ScriptType::Bash,
        ScriptType::Powershell,
        ScriptType::Lua,
        ScriptType::Ruby,
    ];
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScriptType::Python => "python",
            ScriptType::Bash => "bash",
            ScriptType::Powershell => "powershell",
            ScriptType::Lua => "lua",
            ScriptType::Ruby => "ruby",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScriptType {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "python" => Ok(ScriptType::Python),
            "bash" => Ok(ScriptType::Bash),
            "powershell" => Ok(ScriptType::Powershell),
            "lua" => Ok(ScriptType::Lua),
            "ruby" => Ok(ScriptType::Ruby),
            other => Err(CoreError::UnknownVariant {
                kind: "script type",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TriggeredBy
// ---------------------------------------------------------------------------

/// Origin of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    /// On-demand trigger from an external caller (API, CLI).
    Manual,
    /// Fired by the scheduler loop when a recurrence came due.
    Schedule,
}

impl std::fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggeredBy::Manual => "manual",
            TriggeredBy::Schedule => "schedule",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TriggeredBy {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TriggeredBy::Manual),
            "schedule" => Ok(TriggeredBy::Schedule),
            other => Err(CoreError::UnknownVariant {
                kind: "trigger origin",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a single execution attempt.
///
/// `pending → running → {success | failed}`. No transition skips
/// `running`; terminal states never transition further. A record found in
/// `running` after a process crash is orphaned by design and is not
/// auto-recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    /// True for `success` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(CoreError::UnknownVariant {
                kind: "execution status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A stored automation unit: a script with a declared runtime.
///
/// Immutable during a single execution; owned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// UUID v4 string — primary key.
    pub id: String,
    pub name: String,
    pub script_type: ScriptType,
    /// Full source text of the script.
    pub script_content: String,
    /// Disabled tasks are never executed, manually or on schedule.
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Binds a task to a cron recurrence evaluated in an IANA timezone.
///
/// `next_run` is always stored and compared in UTC even though it is
/// computed from a timezone-local evaluation of the cron expression. A
/// schedule with `next_run = None` has never been evaluated and must be
/// seeded before it can fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub task_id: String,
    pub cron_expression: String,
    /// IANA zone name, e.g. "Europe/Berlin".
    pub timezone: String,
    pub is_active: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One concrete attempt to run a task, with captured output and a
/// terminal status.
///
/// Created at the start of an attempt and finalized exactly once; never
/// mutated after finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: String,
    pub task_id: String,
    pub triggered_by: TriggeredBy,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn script_type_roundtrip() {
        for st in ScriptType::ALL {
            assert_eq!(ScriptType::from_str(&st.to_string()).unwrap(), st);
        }
    }

    #[test]
    fn script_type_rejects_unknown() {
        assert!(ScriptType::from_str("perl").is_err());
        assert!(ScriptType::from_str("Python").is_err());
    }

    #[test]
    fn triggered_by_roundtrip() {
        for tb in [TriggeredBy::Manual, TriggeredBy::Schedule] {
            assert_eq!(TriggeredBy::from_str(&tb.to_string()).unwrap(), tb);
        }
    }

    #[test]
    fn execution_status_roundtrip() {
        for st in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(ExecutionStatus::from_str(&st.to_string()).unwrap(), st);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }
}
