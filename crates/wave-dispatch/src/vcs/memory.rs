// crates/wave-dispatch/src/vcs/memory.rs
// ============================================================================
// Module: In-Memory Vcs
// Description: A `Vcs` fake for tests, backed by an in-process map rather
//              than real git worktrees or disk state.
// Purpose: Let the dispatcher's and retry controller's own tests allocate,
//          diff, and release workspaces without a git binary or filesystem.
// Dependencies: wave-core::capability::Vcs, std::sync::Mutex
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use wave_core::Clock;
use wave_core::FixedClock;
use wave_core::Story;
use wave_core::Vcs;
use wave_core::VcsError;
use wave_core::Workspace;
use wave_core::WorkspaceId;

/// Recorded state for one fake allocation.
#[derive(Debug, Default)]
struct Record {
    /// Paths recorded as modified via [`InMemoryVcs::record_write`].
    modified_paths: Vec<String>,
    /// `true` once [`Vcs::merge`] has been called for this workspace.
    merged: bool,
}

/// An in-memory [`Vcs`] fake.
///
/// `materialize` allocates a workspace descriptor with no real worktree
/// behind it; callers record modified paths directly via
/// [`InMemoryVcs::record_write`] to simulate a worker's proposed changes,
/// since there is no real filesystem for [`Vcs::diff`] to inspect.
#[derive(Debug)]
pub struct InMemoryVcs {
    clock: FixedClock,
    counter: AtomicU64,
    records: Mutex<HashMap<WorkspaceId, Record>>,
}

impl InMemoryVcs {
    /// Builds a fake starting its clock at `start_millis`.
    #[must_use]
    pub fn new(start_millis: i64) -> Self {
        Self { clock: FixedClock::new(start_millis), counter: AtomicU64::new(0), records: Mutex::new(HashMap::new()) }
    }

    /// Records that `path` was modified inside `workspace_id`, as if a worker
    /// had written it; [`Vcs::diff`] reflects this on the next call.
    pub fn record_write(&self, workspace_id: &WorkspaceId, path: impl Into<String>) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.entry(workspace_id.clone()).or_default().modified_paths.push(path.into());
    }

    /// Returns `true` iff `workspace_id` was merged.
    #[must_use]
    pub fn is_merged(&self, workspace_id: &WorkspaceId) -> bool {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(workspace_id).is_some_and(|record| record.merged)
    }

    /// Returns `true` iff `workspace_id` is still allocated (not released).
    #[must_use]
    pub fn is_allocated(&self, workspace_id: &WorkspaceId) -> bool {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.contains_key(workspace_id)
    }
}

#[async_trait]
impl Vcs for InMemoryVcs {
    async fn materialize(&self, story: &Story, base_revision: &str) -> Result<Workspace, VcsError> {
        let ordinal = self.counter.fetch_add(1, Ordering::Relaxed);
        let workspace_id = WorkspaceId::new(format!("ws-{}-{ordinal}", story.id.as_str()));
        {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            records.insert(workspace_id.clone(), Record::default());
        }
        Ok(Workspace {
            id: workspace_id,
            story_id: story.id.clone(),
            role: story.role.as_str().to_string(),
            base_revision: base_revision.to_string(),
            branch: format!("wave/{}/{ordinal}", story.id.as_str()),
            scratch_dir: format!("/tmp/wave-fake/{}", story.id.as_str()),
            allowed: story.files.clone(),
            allocated_at: self.clock.now(),
        })
    }

    async fn diff(&self, workspace: &Workspace) -> Result<Vec<String>, VcsError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&workspace.id).map(|record| record.modified_paths.clone()).unwrap_or_default())
    }

    async fn release(&self, workspace_id: &WorkspaceId) -> Result<(), VcsError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(workspace_id);
        Ok(())
    }

    async fn merge(&self, workspace: &Workspace, _into: &str) -> Result<(), VcsError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(&workspace.id) {
            record.merged = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use wave_core::Domain;
    use wave_core::FilePolicy;
    use wave_core::Objective;
    use wave_core::ProjectId;
    use wave_core::Role;
    use wave_core::StoryId;
    use wave_core::StoryThresholds;

    use super::*;

    fn story() -> Story {
        Story {
            id: StoryId::new("AUTH-1"),
            project: ProjectId::new("demo"),
            title: "demo".to_string(),
            domain: Domain::new("AUTH"),
            role: Role::new("backend-1"),
            wave: 1,
            objective: Objective { as_a: "user".to_string(), i_want: "x".to_string(), so_that: "y".to_string() },
            acceptance_criteria: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            files: FilePolicy { create: vec!["src/".to_string()], modify: vec![], forbidden: vec![] },
            stop_conditions: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            thresholds: StoryThresholds { max_tokens: 1_000, max_cost_micros: 1_000, max_duration_minutes: 10 },
        }
    }

    #[tokio::test]
    async fn diff_reflects_recorded_writes() {
        let vcs = InMemoryVcs::new(0);
        let workspace = vcs.materialize(&story(), "main").await.expect("materialize");
        vcs.record_write(&workspace.id, "src/a.rs");
        vcs.record_write(&workspace.id, "src/b.rs");
        let modified = vcs.diff(&workspace).await.expect("diff");
        assert_eq!(modified, vec!["src/a.rs".to_string(), "src/b.rs".to_string()]);
    }

    #[tokio::test]
    async fn release_forgets_the_allocation() {
        let vcs = InMemoryVcs::new(0);
        let workspace = vcs.materialize(&story(), "main").await.expect("materialize");
        assert!(vcs.is_allocated(&workspace.id));
        vcs.release(&workspace.id).await.expect("release");
        assert!(!vcs.is_allocated(&workspace.id));
    }

    #[tokio::test]
    async fn merge_marks_workspace_merged() {
        let vcs = InMemoryVcs::new(0);
        let workspace = vcs.materialize(&story(), "main").await.expect("materialize");
        assert!(!vcs.is_merged(&workspace.id));
        vcs.merge(&workspace, "main").await.expect("merge");
        assert!(vcs.is_merged(&workspace.id));
    }
}
