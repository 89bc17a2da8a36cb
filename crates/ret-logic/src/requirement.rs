// crates/ret-logic/src/requirement.rs
// ============================================================================
// Module: Requirement Tree
// Description: The `Requirement<P>` tree type and its tri-state evaluator.
// Purpose: Represent boolean combinations of domain conditions and evaluate
//          them against a caller-supplied resolver.
// Dependencies: crate::tristate
// ============================================================================

//! ## Overview
//! A [`Requirement<P>`] is a boolean expression tree over an opaque condition
//! type `P`. Callers evaluate it by supplying a resolver function from `P` to
//! [`TriState`]; [`Requirement::evaluate`] threads tri-state logic through the
//! combinators so a tree with unobserved conditions returns `Unknown` rather
//! than guessing.

use serde::Deserialize;
use serde::Serialize;

use crate::tristate::TriState;

/// A boolean requirement tree over condition type `P`.
///
/// # Invariants
/// - `AtLeast { min, members }` is only meaningful when `min <= members.len()`
///   as a u8; [`RequirementValidator`](crate::validate::RequirementValidator)
///   enforces this after parsing untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: Deserialize<'de>"))]
pub enum Requirement<P> {
    /// A single domain condition.
    Condition(P),
    /// Logical negation of a sub-requirement.
    Not(Box<Requirement<P>>),
    /// All sub-requirements must hold.
    All(Vec<Requirement<P>>),
    /// At least one sub-requirement must hold.
    Any(Vec<Requirement<P>>),
    /// At least `min` of the member sub-requirements must hold.
    AtLeast {
        /// Minimum number of members required to hold.
        min: u8,
        /// Member sub-requirements.
        members: Vec<Requirement<P>>,
    },
}

impl<P> Requirement<P> {
    /// Builds a leaf requirement over a single condition.
    pub fn condition(value: P) -> Self {
        Self::Condition(value)
    }

    /// Builds the negation of a requirement.
    pub fn negate(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Builds a conjunction of requirements.
    pub fn and(parts: Vec<Self>) -> Self {
        Self::All(parts)
    }

    /// Builds a disjunction of requirements.
    pub fn or(parts: Vec<Self>) -> Self {
        Self::Any(parts)
    }

    /// Builds an "at least `min` of" group requirement.
    pub fn require_group(min: u8, members: Vec<Self>) -> Self {
        Self::AtLeast { min, members }
    }

    /// Evaluates the requirement tree against a resolver function.
    ///
    /// The resolver is called once per condition leaf in the tree; callers
    /// that need memoization should wrap their own resolver in a cache.
    pub fn evaluate<F>(&self, resolve: &F) -> TriState
    where
        F: Fn(&P) -> TriState,
    {
        match self {
            Self::Condition(value) => resolve(value),
            Self::Not(inner) => inner.evaluate(resolve).negate(),
            Self::All(parts) => TriState::all(parts.iter().map(|part| part.evaluate(resolve))),
            Self::Any(parts) => TriState::any(parts.iter().map(|part| part.evaluate(resolve))),
            Self::AtLeast { min, members } => {
                TriState::at_least(*min, members.iter().map(|member| member.evaluate(resolve)))
            }
        }
    }

    /// Maximum nesting depth of the tree, counting the root as depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Condition(_) => 1,
            Self::Not(inner) => 1 + inner.depth(),
            Self::All(parts) | Self::Any(parts) => {
                1 + parts.iter().map(Self::depth).max().unwrap_or(0)
            }
            Self::AtLeast { members, .. } => {
                1 + members.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Requirement;
    use crate::tristate::TriState;

    fn resolve(flag: &bool) -> TriState {
        if *flag { TriState::True } else { TriState::False }
    }

    #[test]
    fn condition_resolves_directly() {
        let req = Requirement::condition(true);
        assert_eq!(req.evaluate(&resolve), TriState::True);
    }

    #[test]
    fn and_short_circuits_on_false() {
        let req = Requirement::and(vec![Requirement::condition(true), Requirement::condition(false)]);
        assert_eq!(req.evaluate(&resolve), TriState::False);
    }

    #[test]
    fn negate_flips_result() {
        let req = Requirement::negate(Requirement::condition(true));
        assert_eq!(req.evaluate(&resolve), TriState::False);
    }

    #[test]
    fn require_group_counts_true_members() {
        let req = Requirement::require_group(
            2,
            vec![
                Requirement::condition(true),
                Requirement::condition(true),
                Requirement::condition(false),
            ],
        );
        assert_eq!(req.evaluate(&resolve), TriState::True);
    }

    #[test]
    fn depth_counts_nesting() {
        let req = Requirement::and(vec![Requirement::negate(Requirement::condition(true))]);
        assert_eq!(req.depth(), 3);
    }
}
