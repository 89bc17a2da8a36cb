// crates/wave-dispatch/src/vcs/git.rs
// ============================================================================
// Module: Git Workspace Provider
// Description: `Vcs` implementation backed by `git worktree`.
// Purpose: Materialize an isolated, branch-per-story working copy for a
//          dispatch using git's own worktree isolation rather than a full
//          repository clone per allocation (§4.6).
// Dependencies: tokio::process, wave-core::{capability::Vcs, Story, Workspace}
// ============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::process::Command;

use wave_core::Clock;
use wave_core::Story;
use wave_core::SystemClock;
use wave_core::Vcs;
use wave_core::VcsError;
use wave_core::Workspace;
use wave_core::WorkspaceId;

/// Bookkeeping for one allocated worktree, keyed by its workspace id.
struct Allocation {
    /// The worktree's working directory.
    scratch_dir: PathBuf,
}

/// A [`Vcs`] backed by `git worktree`, one worktree per allocated workspace.
///
/// # Invariants
/// - Every workspace this allocates gets its own worktree directory under
///   `workspace_root`, so concurrent dispatches never share a working tree.
/// - `release` removes the worktree but never its branch, so a released
///   workspace's history remains inspectable (§4.6).
pub struct GitVcs {
    /// The canonical checkout new worktrees are created from.
    repo_root: PathBuf,
    /// Directory new worktrees are materialized under.
    workspace_root: PathBuf,
    /// Source of `allocated_at` timestamps.
    clock: Box<dyn Clock>,
    /// Monotonic counter giving each allocation a distinct branch/directory name.
    counter: AtomicU64,
    /// Live allocations, removed on `release`.
    allocations: Mutex<HashMap<WorkspaceId, Allocation>>,
}

impl GitVcs {
    /// Builds a git-backed VCS rooted at an existing repository checkout,
    /// materializing worktrees under `workspace_root`.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        Self::with_clock(repo_root, workspace_root, Box::new(SystemClock))
    }

    /// Builds a git-backed VCS with an injected clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(repo_root: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>, clock: Box<dyn Clock>) -> Self {
        Self {
            repo_root: repo_root.into(),
            workspace_root: workspace_root.into(),
            clock,
            counter: AtomicU64::new(0),
            allocations: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `git` with `args` in `cwd`, returning trimmed stdout on success.
    async fn run_git(&self, args: &[&str], cwd: &Path) -> Result<String, VcsError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| VcsError::OperationFailed(err.to_string()))?;
        if !output.status.success() {
            return Err(VcsError::OperationFailed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn materialize(&self, story: &Story, base_revision: &str) -> Result<Workspace, VcsError> {
        let ordinal = self.counter.fetch_add(1, Ordering::Relaxed);
        let workspace_id = WorkspaceId::new(format!("ws-{}-{ordinal}", story.id.as_str()));
        let branch = format!("wave/{}/{ordinal}", story.id.as_str());
        let scratch_dir = self.workspace_root.join(workspace_id.as_str());

        self.run_git(&["worktree", "add", "-b", &branch, &scratch_dir.to_string_lossy(), base_revision], &self.repo_root).await?;

        {
            let mut allocations = self.allocations.lock().unwrap_or_else(PoisonError::into_inner);
            if allocations.contains_key(&workspace_id) {
                return Err(VcsError::AllocationRace { story_id: story.id.clone() });
            }
            allocations.insert(workspace_id.clone(), Allocation { scratch_dir: scratch_dir.clone() });
        }

        Ok(Workspace {
            id: workspace_id,
            story_id: story.id.clone(),
            role: story.role.as_str().to_string(),
            base_revision: base_revision.to_string(),
            branch,
            scratch_dir: scratch_dir.to_string_lossy().into_owned(),
            allowed: story.files.clone(),
            allocated_at: self.clock.now(),
        })
    }

    async fn diff(&self, workspace: &Workspace) -> Result<Vec<String>, VcsError> {
        let output = self.run_git(&["diff", "--name-only", &workspace.base_revision], Path::new(&workspace.scratch_dir)).await?;
        Ok(output.lines().map(str::to_string).filter(|line| !line.is_empty()).collect())
    }

    async fn release(&self, workspace_id: &WorkspaceId) -> Result<(), VcsError> {
        let allocation = {
            let mut allocations = self.allocations.lock().unwrap_or_else(PoisonError::into_inner);
            allocations.remove(workspace_id)
        };
        let Some(allocation) = allocation else {
            return Ok(());
        };
        self.run_git(&["worktree", "remove", "--force", &allocation.scratch_dir.to_string_lossy()], &self.repo_root).await?;
        Ok(())
    }

    async fn merge(&self, workspace: &Workspace, into: &str) -> Result<(), VcsError> {
        self.run_git(&["checkout", into], &self.repo_root).await?;
        if self.run_git(&["merge", "--no-ff", &workspace.branch], &self.repo_root).await.is_err() {
            let _ = self.run_git(&["merge", "--abort"], &self.repo_root).await;
            return Err(VcsError::MergeConflict { workspace_id: workspace.id.clone() });
        }
        Ok(())
    }
}
