//! Directory shared with the service containers

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SHARED_DIR_NAME: &str = "shared";

/// `shared` next to the executable, with a relative invocation resolved
/// against `cwd`
pub fn default_shared_dir(argv0: &OsStr, cwd: &Path) -> PathBuf {
    let parent = Path::new(argv0).parent().unwrap_or_else(|| Path::new(""));
    cwd.join(parent).join(SHARED_DIR_NAME)
}

/// Create the directory if needed; repeated calls succeed
pub fn ensure_shared_dir(path: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(path)?;
    let canonical = path.canonicalize()?;
    debug!("Shared directory: {}", canonical.display());
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dir_follows_invocation_path() {
        let cwd = Path::new("/work");
        assert_eq!(
            default_shared_dir(OsStr::new("./bin/streaming-testbed"), cwd),
            PathBuf::from("/work/./bin/shared")
        );
        assert_eq!(
            default_shared_dir(OsStr::new("streaming-testbed"), cwd),
            PathBuf::from("/work/shared")
        );
        // absolute invocations ignore cwd
        assert_eq!(
            default_shared_dir(OsStr::new("/opt/testbed/streaming-testbed"), cwd),
            PathBuf::from("/opt/testbed/shared")
        );
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join(SHARED_DIR_NAME);

        let first = ensure_shared_dir(&dir).unwrap();
        std::fs::write(first.join("capture.pcap"), b"data").unwrap();
        let second = ensure_shared_dir(&dir).unwrap();

        assert_eq!(first, second);
        assert!(second.is_dir());
        assert!(second.join("capture.pcap").exists(), "existing content survives");
    }

    #[test]
    fn test_ensure_fails_under_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();

        assert!(ensure_shared_dir(&file.join(SHARED_DIR_NAME)).is_err());
    }
}
