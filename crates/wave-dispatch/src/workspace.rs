// crates/wave-dispatch/src/workspace.rs
// ============================================================================
// Module: Workspace Write Sandbox
// Description: Applies a worker's proposed writes inside an allocated
//              workspace's scratch directory through a capability-scoped
//              directory handle.
// Purpose: Give the dispatcher an OS-level second line of defense against
//          path traversal, independent of the story-level allow/deny check
//          `Workspace::check_boundary` already performs (§4.6).
// Dependencies: cap-std, cap-primitives, wave-core::Workspace
// ============================================================================

use std::io::Write as _;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use cap_primitives::fs::FollowSymlinks;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use cap_std::fs::OpenOptions;

use wave_core::Workspace;

/// Error applying a worker's proposed writes to a workspace's scratch directory.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceIoError {
    /// The scratch directory itself could not be opened.
    #[error("failed to open workspace scratch directory {path}: {reason}")]
    OpenScratchDir {
        /// The scratch directory path.
        path: String,
        /// The underlying error message.
        reason: String,
    },
    /// A proposed path climbed out of the scratch directory or was absolute.
    #[error("path {path} escapes the workspace scratch directory")]
    PathEscape {
        /// The offending path as proposed by the worker.
        path: String,
    },
    /// Writing a file inside the scratch directory failed.
    #[error("failed to write {path}: {reason}")]
    WriteFailed {
        /// The path being written.
        path: String,
        /// The underlying error message.
        reason: String,
    },
}

/// Applies every proposed `(path, content)` write inside `workspace`'s
/// scratch directory.
///
/// Each path is validated to contain no parent (`..`) or absolute-root
/// component before the capability API ever sees it; opening the scratch
/// directory with [`cap_std::fs::Dir::open_ambient_dir`] and every file with
/// [`FollowSymlinks::No`] then makes traversal impossible even if that
/// validation were buggy.
///
/// # Errors
/// Returns [`WorkspaceIoError`] if the scratch directory cannot be opened, a
/// path escapes it, or a write fails.
pub fn apply_writes(workspace: &Workspace, writes: &[(String, String)]) -> Result<(), WorkspaceIoError> {
    let root = Path::new(&workspace.scratch_dir);
    let dir = Dir::open_ambient_dir(root, ambient_authority())
        .map_err(|err| WorkspaceIoError::OpenScratchDir { path: workspace.scratch_dir.clone(), reason: err.to_string() })?;

    for (path, content) in writes {
        let relative = safe_relative_path(path).ok_or_else(|| WorkspaceIoError::PathEscape { path: path.clone() })?;

        if let Some(parent) = relative.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            dir.create_dir_all(parent).map_err(|err| WorkspaceIoError::WriteFailed { path: path.clone(), reason: err.to_string() })?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        options._cap_fs_ext_follow(FollowSymlinks::No);
        let mut file = dir
            .open_with(&relative, &options)
            .map_err(|err| WorkspaceIoError::WriteFailed { path: path.clone(), reason: err.to_string() })?;
        file.write_all(content.as_bytes()).map_err(|err| WorkspaceIoError::WriteFailed { path: path.clone(), reason: err.to_string() })?;
    }
    Ok(())
}

/// Rejects an absolute path or one containing a `..` component, returning the
/// validated, normalized relative path on success.
fn safe_relative_path(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return None;
    }
    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if normalized.as_os_str().is_empty() { None } else { Some(normalized) }
}

#[cfg(test)]
mod tests {
    use wave_core::FilePolicy;
    use wave_core::StoryId;
    use wave_core::Timestamp;
    use wave_core::WorkspaceId;

    use super::*;

    fn workspace(scratch_dir: &Path) -> Workspace {
        Workspace {
            id: WorkspaceId::new("ws-1"),
            story_id: StoryId::new("AUTH-1"),
            role: "backend-1".to_string(),
            base_revision: "abc123".to_string(),
            branch: "wave/AUTH-1/0".to_string(),
            scratch_dir: scratch_dir.to_string_lossy().into_owned(),
            allowed: FilePolicy { create: vec!["src/".to_string()], modify: vec![], forbidden: vec![] },
            allocated_at: Timestamp::from_unix_millis(0),
        }
    }

    #[test]
    fn writes_land_under_scratch_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(dir.path());
        apply_writes(&ws, &[("src/auth/session.rs".to_string(), "fn main() {}".to_string())]).expect("write succeeds");
        let written = std::fs::read_to_string(dir.path().join("src/auth/session.rs")).expect("read back");
        assert_eq!(written, "fn main() {}");
    }

    #[test]
    fn parent_dir_component_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(dir.path());
        let err = apply_writes(&ws, &[("../escape.rs".to_string(), "evil".to_string())]).unwrap_err();
        assert!(matches!(err, WorkspaceIoError::PathEscape { .. }));
    }

    #[test]
    fn absolute_path_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(dir.path());
        let err = apply_writes(&ws, &[("/etc/passwd".to_string(), "evil".to_string())]).unwrap_err();
        assert!(matches!(err, WorkspaceIoError::PathEscape { .. }));
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(dir.path());
        apply_writes(&ws, &[("src/a.rs".to_string(), "one".to_string())]).expect("first write");
        apply_writes(&ws, &[("src/a.rs".to_string(), "two".to_string())]).expect("second write");
        let written = std::fs::read_to_string(dir.path().join("src/a.rs")).expect("read back");
        assert_eq!(written, "two");
    }
}
