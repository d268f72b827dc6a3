use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Wall-clock budget for a single script execution. The child is killed
/// when this expires.
pub const SCRIPT_TIMEOUT_SECS: u64 = 300;
/// Default poll period of the scheduler loop.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
/// Bounded wait for the scheduler loop to exit after `stop()`.
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Top-level config (autotask.toml + AUTOTASK_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutotaskConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-schedule polls.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
        }
    }
}

impl AutotaskConfig {
    /// Load config: explicit path > AUTOTASK_CONFIG env > ~/.autotask/autotask.toml.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("AUTOTASK_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        // Double underscore separates nesting levels so multi-word field
        // names survive: AUTOTASK_SCHEDULER__CHECK_INTERVAL_SECS maps to
        // scheduler.check_interval_secs.
        let config: AutotaskConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("AUTOTASK_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.autotask/autotask.toml")
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.autotask/autotask.db")
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}
