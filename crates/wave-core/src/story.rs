// crates/wave-core/src/story.rs
// ============================================================================
// Module: Story
// Description: A unit of development work with its acceptance criteria,
//              allow/deny lists, and budget thresholds.
// Purpose: Carry everything the dispatcher, safety evaluator, and budget
//          accountant need to drive one story through the gate sequence.
// Dependencies: crate::ids, serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::ids::ProjectId;
use crate::ids::StoryId;

/// A project-defined grouping for a story; keeps conflicting work apart.
///
/// Domains are free-form project vocabulary (`AUTH`, `BILLING`, `SHARED`);
/// WAVE treats them as opaque tokens used only for disjointness checks
/// (§5: two dispatches on the same wave may run concurrently only if their
/// domains are disjoint).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    /// Builds a domain tag from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the domain tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The worker role assigned to a story (e.g. `frontend-1`, `backend-2`, `qa`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Builds a role from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the role as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `{as_a, i_want, so_that}` user-story framing for the story's objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// The persona the story serves.
    pub as_a: String,
    /// What that persona wants.
    pub i_want: String,
    /// Why they want it.
    pub so_that: String,
}

/// Token/cost/time ceilings that bound a single story's dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryThresholds {
    /// Maximum tokens (input + output) the story may consume in total.
    pub max_tokens: u64,
    /// Maximum estimated cost in USD micro-dollars (1e-6 USD) the story may consume.
    pub max_cost_micros: u64,
    /// Maximum wall-clock duration, in minutes, any single dispatch may run.
    pub max_duration_minutes: u32,
}

/// Allow-list / deny-list of file paths a story's dispatches may touch.
///
/// # Invariants
/// - A path matching both `create`/`modify` and `forbidden` is treated as
///   forbidden (deny wins ties; see [`FilePolicy::permits`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePolicy {
    /// Paths (or glob-style prefixes) the story may create.
    pub create: Vec<String>,
    /// Paths (or glob-style prefixes) the story may modify.
    pub modify: Vec<String>,
    /// Paths forbidden to the story regardless of `create`/`modify`.
    pub forbidden: Vec<String>,
}

impl FilePolicy {
    /// Returns `true` iff `path` is allowed by `create`/`modify` and not denied.
    ///
    /// Matching is prefix-based over `/`-separated path segments, mirroring
    /// how project-relative allow-lists are typically authored
    /// (`"src/auth/"` matches `"src/auth/session.rs"`).
    #[must_use]
    pub fn permits(&self, path: &str) -> bool {
        let denied = self.forbidden.iter().any(|pattern| path_matches(pattern, path));
        if denied {
            return false;
        }
        self.create.iter().chain(self.modify.iter()).any(|pattern| path_matches(pattern, path))
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    let pattern = pattern.trim_end_matches('/');
    path == pattern || path.starts_with(&format!("{pattern}/"))
}

/// A unit of development work inside a session.
///
/// # Invariants
/// - `role` and `domain` are immutable once the story enters dispatch (§3);
///   callers must not mutate those fields after the first `dispatch` call.
/// - `files.forbidden` is always a superset of any globally forbidden paths;
///   enforcing the global deny-list is the session orchestrator's
///   responsibility when constructing a [`Story`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Stable identifier, unique within the owning session.
    pub id: StoryId,
    /// Project this story belongs to.
    pub project: ProjectId,
    /// Human-readable title.
    pub title: String,
    /// Project-defined domain tag.
    pub domain: Domain,
    /// Assigned worker role.
    pub role: Role,
    /// Wave ordinal; higher waves may depend on lower ones completing first.
    pub wave: u32,
    /// `{as_a, i_want, so_that}` framing.
    pub objective: Objective,
    /// Ordered, testable acceptance criteria; validation requires at least three.
    pub acceptance_criteria: Vec<String>,
    /// File create/modify/forbidden policy.
    pub files: FilePolicy,
    /// Content predicates that must remain false throughout dispatch.
    pub stop_conditions: Vec<String>,
    /// Token/cost/time ceilings.
    pub thresholds: StoryThresholds,
}

/// Error returned when a submitted story fails the minimum validation rules in §6.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoryValidationError {
    /// Fewer than three acceptance criteria were supplied.
    #[error("story {story_id} has {count} acceptance criteria, at least 3 required")]
    TooFewAcceptanceCriteria {
        /// The offending story.
        story_id: StoryId,
        /// Number of criteria actually supplied.
        count: usize,
    },
    /// Fewer than three stop-conditions were supplied.
    #[error("story {story_id} has {count} stop-conditions, at least 3 required")]
    TooFewStopConditions {
        /// The offending story.
        story_id: StoryId,
        /// Number of stop-conditions actually supplied.
        count: usize,
    },
    /// A path appeared in both the allow-list and the deny-list, which the
    /// wire format treats as an authoring error rather than silently
    /// resolving the tie.
    #[error("story {story_id} lists {path} in both an allow-list and the deny-list")]
    ConflictingFilePolicy {
        /// The offending story.
        story_id: StoryId,
        /// The path listed in both places.
        path: String,
    },
}

impl Story {
    /// Validates the minima required by the story submission contract (§6).
    ///
    /// # Errors
    /// Returns [`StoryValidationError`] if acceptance criteria or
    /// stop-conditions fall below the required minimum of three, or if a
    /// path is listed as both allowed and forbidden.
    pub fn validate(&self) -> Result<(), StoryValidationError> {
        if self.acceptance_criteria.len() < 3 {
            return Err(StoryValidationError::TooFewAcceptanceCriteria {
                story_id: self.id.clone(),
                count: self.acceptance_criteria.len(),
            });
        }
        if self.stop_conditions.len() < 3 {
            return Err(StoryValidationError::TooFewStopConditions {
                story_id: self.id.clone(),
                count: self.stop_conditions.len(),
            });
        }
        for path in self.files.create.iter().chain(self.files.modify.iter()) {
            if self.files.forbidden.iter().any(|forbidden| forbidden == path) {
                return Err(StoryValidationError::ConflictingFilePolicy {
                    story_id: self.id.clone(),
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_story() -> Story {
        Story {
            id: StoryId::new("AUTH-1"),
            project: ProjectId::new("demo"),
            title: "Add session refresh".to_string(),
            domain: Domain::new("AUTH"),
            role: Role::new("backend-1"),
            wave: 1,
            objective: Objective {
                as_a: "user".to_string(),
                i_want: "my session to refresh".to_string(),
                so_that: "I stay logged in".to_string(),
            },
            acceptance_criteria: vec![
                "refresh returns 200 on valid token".to_string(),
                "refresh returns 401 on expired token".to_string(),
                "refresh rotates the refresh token".to_string(),
            ],
            files: FilePolicy {
                create: vec!["src/auth/refresh.rs".to_string()],
                modify: vec!["src/auth/mod.rs".to_string()],
                forbidden: vec!["src/billing/".to_string()],
            },
            stop_conditions: vec![
                "no plaintext secret in logs".to_string(),
                "no disabled auth check".to_string(),
                "no removed rate limit".to_string(),
            ],
            thresholds: StoryThresholds { max_tokens: 200_000, max_cost_micros: 5_000_000, max_duration_minutes: 30 },
        }
    }

    #[test]
    fn valid_story_passes() {
        assert!(sample_story().validate().is_ok());
    }

    #[test]
    fn too_few_acceptance_criteria_rejected() {
        let mut story = sample_story();
        story.acceptance_criteria.truncate(1);
        assert!(matches!(story.validate(), Err(StoryValidationError::TooFewAcceptanceCriteria { .. })));
    }

    #[test]
    fn too_few_stop_conditions_rejected() {
        let mut story = sample_story();
        story.stop_conditions.truncate(2);
        assert!(matches!(story.validate(), Err(StoryValidationError::TooFewStopConditions { .. })));
    }

    #[test]
    fn conflicting_allow_and_deny_rejected() {
        let mut story = sample_story();
        story.files.forbidden.push("src/auth/refresh.rs".to_string());
        assert!(matches!(story.validate(), Err(StoryValidationError::ConflictingFilePolicy { .. })));
    }

    #[test]
    fn file_policy_denies_beat_allows() {
        let policy = FilePolicy {
            create: vec!["src/".to_string()],
            modify: vec![],
            forbidden: vec!["src/secrets/".to_string()],
        };
        assert!(policy.permits("src/main.rs"));
        assert!(!policy.permits("src/secrets/key.rs"));
        assert!(!policy.permits("docs/readme.md"));
    }
}
