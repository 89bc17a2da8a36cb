// crates/ret-logic/src/validate.rs
// ============================================================================
// Module: Requirement Validation
// Description: Structural validation for parsed requirement trees.
// Purpose: Reject degenerate trees (excessive depth, impossible group
//          arities) before a caller evaluates untrusted DSL input.
// Dependencies: crate::requirement
// ============================================================================

//! ## Overview
//! [`dsl::parse_requirement`](crate::dsl::parse_requirement) runs every parsed
//! tree through [`RequirementValidator`] before returning it. The validator
//! enforces limits that the grammar itself cannot express, such as
//! `at_least(min, ...)` requiring `min <= members.len()`.

use std::fmt;

use crate::requirement::Requirement;

/// Default maximum tree depth accepted by [`RequirementValidator::with_defaults`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Errors raised while validating a parsed requirement tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The tree exceeded the configured maximum depth.
    DepthExceeded {
        /// Configured maximum depth.
        max_depth: usize,
        /// Observed depth.
        actual_depth: usize,
    },
    /// An `AtLeast` group required more members than it had.
    GroupArityImpossible {
        /// Requested minimum.
        min: u8,
        /// Number of members available.
        member_count: usize,
    },
    /// An `AtLeast` group or `All`/`Any` combinator had zero members.
    EmptyGroup,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthExceeded { max_depth, actual_depth } => {
                write!(f, "requirement depth {actual_depth} exceeds limit {max_depth}")
            }
            Self::GroupArityImpossible { min, member_count } => {
                write!(f, "group requires {min} of {member_count} members, which is impossible")
            }
            Self::EmptyGroup => write!(f, "requirement group has no members"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates structural invariants of a [`Requirement`] tree.
///
/// # Invariants
/// - `max_depth` bounds the tree depth as defined by
///   [`Requirement::depth`](crate::requirement::Requirement::depth).
#[derive(Debug, Clone, Copy)]
pub struct RequirementValidator {
    max_depth: usize,
}

impl RequirementValidator {
    /// Builds a validator with the given maximum depth.
    #[must_use]
    pub const fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Builds a validator using [`DEFAULT_MAX_DEPTH`].
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }

    /// Validates a requirement tree, returning the first violation found.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if the tree exceeds the configured depth
    /// or contains an impossible/empty group.
    pub fn validate<P>(&self, requirement: &Requirement<P>) -> Result<(), ValidationError> {
        let depth = requirement.depth();
        if depth > self.max_depth {
            return Err(ValidationError::DepthExceeded { max_depth: self.max_depth, actual_depth: depth });
        }
        Self::validate_groups(requirement)
    }

    fn validate_groups<P>(requirement: &Requirement<P>) -> Result<(), ValidationError> {
        match requirement {
            Requirement::Condition(_) => Ok(()),
            Requirement::Not(inner) => Self::validate_groups(inner),
            Requirement::All(parts) | Requirement::Any(parts) => {
                if parts.is_empty() {
                    return Err(ValidationError::EmptyGroup);
                }
                parts.iter().try_for_each(Self::validate_groups)
            }
            Requirement::AtLeast { min, members } => {
                if members.is_empty() {
                    return Err(ValidationError::EmptyGroup);
                }
                if usize::from(*min) > members.len() {
                    return Err(ValidationError::GroupArityImpossible {
                        min: *min,
                        member_count: members.len(),
                    });
                }
                members.iter().try_for_each(Self::validate_groups)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RequirementValidator;
    use super::ValidationError;
    use crate::requirement::Requirement;

    #[test]
    fn rejects_impossible_group_arity() {
        let req = Requirement::require_group(3, vec![Requirement::condition(1), Requirement::condition(2)]);
        let err = RequirementValidator::with_defaults().validate(&req).unwrap_err();
        assert_eq!(err, ValidationError::GroupArityImpossible { min: 3, member_count: 2 });
    }

    #[test]
    fn rejects_empty_group() {
        let req: Requirement<u8> = Requirement::and(Vec::new());
        let err = RequirementValidator::with_defaults().validate(&req).unwrap_err();
        assert_eq!(err, ValidationError::EmptyGroup);
    }

    #[test]
    fn accepts_well_formed_tree() {
        let req = Requirement::require_group(1, vec![Requirement::condition(1), Requirement::condition(2)]);
        assert!(RequirementValidator::with_defaults().validate(&req).is_ok());
    }

    #[test]
    fn rejects_excessive_depth() {
        let mut req = Requirement::condition(1);
        for _ in 0 .. 5 {
            req = Requirement::negate(req);
        }
        let err = RequirementValidator::new(3).validate(&req).unwrap_err();
        assert!(matches!(err, ValidationError::DepthExceeded { max_depth: 3, .. }));
    }
}
