//! Scoped staging of script content as a temporary file.
//!
//! Concurrent executions of the same task are not mutually excluded
//! upstream, so artifact names carry the task id, the execution id, and
//! tempfile's random suffix. Removal is tied to drop, which covers every
//! exit path: success, nonzero exit, timeout, and interpreter-missing.

use std::io::Write;
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::error::{Result, RuntimeError};

/// A script materialized on disk for the duration of one execution.
/// The backing file is deleted when this value is dropped.
pub struct StagedScript {
    file: NamedTempFile,
}

impl StagedScript {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Write `content` to a uniquely named temporary file with the given
/// extension. When `executable` is set the file gets mode 0o755 so the
/// interpreter can exec it directly.
pub fn stage_script(
    content: &str,
    extension: &str,
    task_id: &str,
    execution_id: &str,
    executable: bool,
) -> Result<StagedScript> {
    let mut file = Builder::new()
        .prefix(&format!("autotask-{task_id}-{execution_id}-"))
        .suffix(extension)
        .tempfile()
        .map_err(RuntimeError::Stage)?;

    file.write_all(content.as_bytes())
        .map_err(RuntimeError::Stage)?;
    file.flush().map_err(RuntimeError::Stage)?;

    #[cfg(unix)]
    if executable {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o755))
            .map_err(RuntimeError::Stage)?;
    }
    #[cfg(not(unix))]
    let _ = executable;

    debug!(path = %file.path().display(), "script staged");
    Ok(StagedScript { file })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_file_holds_content() {
        let staged = stage_script("echo hi", ".sh", "task1", "exec1", true).unwrap();
        let read = std::fs::read_to_string(staged.path()).unwrap();
        assert_eq!(read, "echo hi");
        let name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("autotask-task1-exec1-"));
        assert!(name.ends_with(".sh"));
    }

    #[test]
    fn drop_removes_artifact() {
        let path = {
            let staged = stage_script("print('x')", ".py", "t", "e", false).unwrap();
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn executable_flag_sets_mode() {
        use std::os::unix::fs::PermissionsExt;
        let staged = stage_script("true", ".sh", "t", "e", true).unwrap();
        let mode = std::fs::metadata(staged.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }

    #[test]
    fn concurrent_stagings_never_collide() {
        let a = stage_script("1", ".py", "same", "same", false).unwrap();
        let b = stage_script("2", ".py", "same", "same", false).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
