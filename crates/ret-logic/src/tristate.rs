// crates/ret-logic/src/tristate.rs
// ============================================================================
// Module: Tri-State Logic
// Description: Three-valued logic tables used to evaluate requirement trees.
// Purpose: Let a requirement evaluate to "unknown" rather than forcing a
//          premature true/false answer when a condition has not been
//          observed yet.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `TriState` implements the standard Kleene three-valued logic tables:
//! `Unknown` is absorbing for `Not`, and for `And`/`Or` it behaves like
//! "could still go either way" — `False And Unknown = False` (the `False`
//! already decides it), but `True And Unknown = Unknown`.

use serde::Deserialize;
use serde::Serialize;

/// A boolean value that may not yet be known.
///
/// # Invariants
/// - `Unknown` is distinct from both `True` and `False`; callers must not
///   coerce it to a boolean without an explicit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    /// The condition is known to hold.
    True,
    /// The condition is known not to hold.
    False,
    /// The condition has not been observed yet.
    Unknown,
}

impl TriState {
    /// Returns `true` iff the value is [`TriState::True`].
    #[must_use]
    pub const fn is_true(self) -> bool {
        matches!(self, Self::True)
    }

    /// Returns `true` iff the value is [`TriState::False`].
    #[must_use]
    pub const fn is_false(self) -> bool {
        matches!(self, Self::False)
    }

    /// Returns `true` iff the value is [`TriState::Unknown`].
    #[must_use]
    pub const fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Kleene negation: `True`/`False` flip, `Unknown` stays `Unknown`.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown => Self::Unknown,
        }
    }

    /// Kleene conjunction over an iterator of values.
    ///
    /// `False` is absorbing; `Unknown` only wins if nothing is `False` and
    /// at least one value is `Unknown`; an empty iterator is vacuously `True`.
    #[must_use]
    pub fn all(values: impl IntoIterator<Item = Self>) -> Self {
        let mut saw_unknown = false;
        for value in values {
            match value {
                Self::False => return Self::False,
                Self::Unknown => saw_unknown = true,
                Self::True => {}
            }
        }
        if saw_unknown { Self::Unknown } else { Self::True }
    }

    /// Kleene disjunction over an iterator of values.
    ///
    /// `True` is absorbing; `Unknown` only wins if nothing is `True` and at
    /// least one value is `Unknown`; an empty iterator is vacuously `False`.
    #[must_use]
    pub fn any(values: impl IntoIterator<Item = Self>) -> Self {
        let mut saw_unknown = false;
        for value in values {
            match value {
                Self::True => return Self::True,
                Self::Unknown => saw_unknown = true,
                Self::False => {}
            }
        }
        if saw_unknown { Self::Unknown } else { Self::False }
    }

    /// "At least `min` of these values are `True`" under Kleene semantics.
    ///
    /// Resolves to `True` as soon as enough members are known `True`; to
    /// `False` as soon as too few members can possibly still become `True`;
    /// otherwise `Unknown`.
    #[must_use]
    pub fn at_least(min: u8, values: impl IntoIterator<Item = Self>) -> Self {
        let mut true_count: u32 = 0;
        let mut maybe_count: u32 = 0;
        for value in values {
            match value {
                Self::True => {
                    true_count += 1;
                    maybe_count += 1;
                }
                Self::Unknown => maybe_count += 1,
                Self::False => {}
            }
        }
        let min = u32::from(min);
        if true_count >= min {
            Self::True
        } else if maybe_count < min {
            Self::False
        } else {
            Self::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TriState;

    #[test]
    fn negate_flips_known_values() {
        assert_eq!(TriState::True.negate(), TriState::False);
        assert_eq!(TriState::False.negate(), TriState::True);
        assert_eq!(TriState::Unknown.negate(), TriState::Unknown);
    }

    #[test]
    fn all_is_false_if_any_false_even_with_unknowns() {
        let values = [TriState::True, TriState::Unknown, TriState::False];
        assert_eq!(TriState::all(values), TriState::False);
    }

    #[test]
    fn all_is_unknown_if_no_false_but_some_unknown() {
        let values = [TriState::True, TriState::Unknown];
        assert_eq!(TriState::all(values), TriState::Unknown);
    }

    #[test]
    fn any_is_true_if_any_true_even_with_unknowns() {
        let values = [TriState::False, TriState::Unknown, TriState::True];
        assert_eq!(TriState::any(values), TriState::True);
    }

    #[test]
    fn at_least_resolves_true_early() {
        let values = [TriState::True, TriState::True, TriState::Unknown];
        assert_eq!(TriState::at_least(2, values), TriState::True);
    }

    #[test]
    fn at_least_resolves_false_when_unreachable() {
        let values = [TriState::True, TriState::False, TriState::False];
        assert_eq!(TriState::at_least(2, values), TriState::False);
    }

    #[test]
    fn at_least_stays_unknown_while_reachable() {
        let values = [TriState::True, TriState::Unknown, TriState::False];
        assert_eq!(TriState::at_least(2, values), TriState::Unknown);
    }
}
