//! Checks that must pass before any device is touched.
use crate::error::PreflightError;
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tracing::debug;

/// The file synchronizer used for the copy step.
pub const SYNC_TOOL: &str = "rsync";

/// Returns `true` when the process runs with an effective uid of 0.
pub fn is_superuser() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Resolves `program` against the directories of a `PATH`-style value.
///
/// Only regular files with at least one execute bit set are considered.
pub fn find_in_path(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| {
            fs::metadata(candidate)
                .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
}

/// Verifies root privileges and the presence of [`SYNC_TOOL`].
pub fn check() -> Result<(), PreflightError> {
    if !is_superuser() {
        return Err(PreflightError::NotRoot);
    }

    let path_var = env::var_os("PATH").unwrap_or_default();
    match find_in_path(SYNC_TOOL, &path_var) {
        Some(path) => {
            debug!(path = %path.display(), "found {SYNC_TOOL}");
            Ok(())
        }
        None => Err(PreflightError::MissingTool(SYNC_TOOL.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs::File;
    use tempfile::tempdir;

    fn make_file(path: &std::path::Path, mode: u32) {
        File::create(path).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_find_in_path_picks_first_executable() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        make_file(&first.path().join("rsync"), 0o644);
        make_file(&second.path().join("rsync"), 0o755);

        let path_var = env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(
            find_in_path("rsync", &path_var),
            Some(second.path().join("rsync"))
        );
    }

    #[test]
    fn test_find_in_path_ignores_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("rsync")).unwrap();

        let path_var = OsString::from(dir.path());
        assert_eq!(find_in_path("rsync", &path_var), None);
    }

    #[test]
    fn test_find_in_path_empty() {
        assert_eq!(find_in_path("rsync", OsStr::new("")), None);
    }
}
