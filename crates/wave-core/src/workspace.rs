// crates/wave-core/src/workspace.rs
// ============================================================================
// Module: Workspace
// Description: A descriptor for one isolated, per-agent working copy.
// Purpose: Carry the metadata the dispatcher and the domain-boundary check
//          need without depending on how the workspace provider materializes
//          files on disk (that lives behind the `Vcs` capability trait).
// Dependencies: crate::{ids, story, time}
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::ids::StoryId;
use crate::ids::WorkspaceId;
use crate::story::FilePolicy;
use crate::time::Timestamp;

/// A materialized, isolated per-agent working copy.
///
/// # Invariants
/// - Writes made inside a workspace are invisible to other concurrent
///   dispatches until the owning dispatch releases it.
/// - `allowed` is derived once, at allocation time, from the story's
///   domain/allow-list, and does not change for the workspace's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique identifier for this allocation.
    pub id: WorkspaceId,
    /// The story this workspace was allocated for.
    pub story_id: StoryId,
    /// The worker role the workspace was allocated for.
    pub role: String,
    /// The project revision the workspace was materialized from.
    pub base_revision: String,
    /// The dedicated branch this workspace's changes accumulate on.
    pub branch: String,
    /// Filesystem path to the workspace's scratch directory.
    pub scratch_dir: String,
    /// The allow/deny policy writes in this workspace must satisfy.
    pub allowed: FilePolicy,
    /// When this workspace was allocated.
    pub allocated_at: Timestamp,
}

/// The outcome of checking a workspace's modified paths against its policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryCheck {
    /// Every modified path satisfied the allow/deny policy.
    Satisfied,
    /// At least one modified path violated the policy.
    Violated {
        /// The paths that fell outside the allow-list or inside the deny-list.
        offending_paths: Vec<String>,
    },
}

impl Workspace {
    /// Checks a set of modified paths against this workspace's allow/deny policy.
    ///
    /// This is the hard precondition C6 enforces before a `gate-completed`
    /// signal may be emitted (§4.6): every offending path is collected, not
    /// just the first, so the caller can report a complete violation.
    #[must_use]
    pub fn check_boundary<'a>(&self, modified_paths: impl IntoIterator<Item = &'a str>) -> BoundaryCheck {
        let offending: Vec<String> =
            modified_paths.into_iter().filter(|path| !self.allowed.permits(path)).map(str::to_string).collect();
        if offending.is_empty() { BoundaryCheck::Satisfied } else { BoundaryCheck::Violated { offending_paths: offending } }
    }
}
