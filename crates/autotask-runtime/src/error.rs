use thiserror::Error;

/// Errors that prevent a script from producing an exit code.
///
/// A script that runs and exits nonzero is *not* an error here — the
/// executor classifies that from [`ScriptOutput`](crate::ScriptOutput).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime is a documented platform restriction on this host.
    #[error("{runtime} scripts are not supported on {os}")]
    PlatformUnsupported { runtime: &'static str, os: &'static str },

    /// The interpreter executable is missing from the host.
    #[error("interpreter not found on this system: {interpreter}")]
    InterpreterMissing { interpreter: String },

    /// The child exceeded its wall-clock budget and was killed.
    #[error("script timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The script content could not be written to a temporary file.
    #[error("failed to stage script: {0}")]
    Stage(#[source] std::io::Error),

    /// The child could not be spawned or awaited.
    #[error("failed to run interpreter: {0}")]
    Spawn(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
