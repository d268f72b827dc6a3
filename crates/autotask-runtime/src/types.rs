/// Captured result of one interpreter invocation.
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    /// Process exit code (0 = success).
    pub exit_code: i32,

    /// Captured standard output, decoded as UTF-8 (lossy).
    pub stdout: String,

    /// Captured standard error, decoded as UTF-8 (lossy).
    pub stderr: String,
}

impl ScriptOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
