// crates/wave-safety/src/boundary.rs
// ============================================================================
// Module: Boundary Violation Rule
// Description: Flags a write whose target path falls outside a story's
//              allow-list or inside its deny-list.
// Purpose: Category 4 of the safety rule taxonomy; shares FilePolicy with
//          the workspace provider (C6) so both enforce the identical rule.
// Dependencies: wave-core::FilePolicy
// ============================================================================

use wave_core::FilePolicy;
use wave_core::Violation;
use wave_core::ViolationKind;

/// Checks a single modified path against the story's file policy.
///
/// Returns `Some` with a hard-block penalty iff `path` is not permitted.
#[must_use]
pub fn evaluate(policy: &FilePolicy, path: &str) -> Option<Violation> {
    if policy.permits(path) {
        None
    } else {
        Some(Violation {
            kind: ViolationKind::BoundaryViolation,
            penalty: 0.1,
            description: format!("{path} falls outside the story's allow-list or inside its deny-list"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FilePolicy {
        FilePolicy {
            create: vec!["src/auth/".to_string()],
            modify: vec![],
            forbidden: vec!["src/auth/secrets.rs".to_string()],
        }
    }

    #[test]
    fn allowed_path_is_clean() {
        assert!(evaluate(&policy(), "src/auth/login.rs").is_none());
    }

    #[test]
    fn forbidden_path_is_flagged() {
        let violation = evaluate(&policy(), "src/auth/secrets.rs").expect("should flag");
        assert_eq!(violation.penalty, 0.1);
    }

    #[test]
    fn unlisted_path_is_flagged() {
        assert!(evaluate(&policy(), "src/billing/invoice.rs").is_some());
    }
}
