// crates/wave-core/src/ids.rs
// ============================================================================
// Module: Identifiers
// Description: Canonical opaque identifiers for sessions, stories, and signals.
// Purpose: Give every entity in the control plane a strongly typed,
//          serializable identifier with a stable wire form.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque newtypes over `String` (for caller-supplied,
//! human-meaningful ids like story ids) or `u64` (for system-generated
//! monotone counters like signal sequence numbers). Wrapping them prevents a
//! `StoryId` and a `SessionId` from being swapped at a call site by accident.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Builds a new ", stringify!($name), " from any string-like value.")]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(SessionId, "Identifies a session for its entire lifetime.");
string_id!(StoryId, "Identifies a story within a session.");
string_id!(ProjectId, "Identifies the project a session operates on.");
string_id!(SignalId, "Identifies a single durable signal on the bus.");
string_id!(WorkspaceId, "Identifies one allocated agent workspace.");

/// A monotonically increasing sequence number, unique and strictly ordered
/// within a single session.
///
/// # Invariants
/// - The first sequence number issued for a session is `1`; `0` is reserved
///   to mean "no checkpoint yet" in [`Sequence::NONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    /// Sentinel meaning "no signal has been observed / no checkpoint exists".
    pub const NONE: Self = Self(0);

    /// Builds a sequence number from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Sequence;
    use super::StoryId;

    #[test]
    fn sequence_none_is_zero_and_next_is_one() {
        assert_eq!(Sequence::NONE.get(), 0);
        assert_eq!(Sequence::NONE.next().get(), 1);
    }

    #[test]
    fn sequence_orders_numerically() {
        assert!(Sequence::new(1) < Sequence::new(2));
    }

    #[test]
    fn story_id_roundtrips_through_json() {
        let id = StoryId::new("AUTH-12");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"AUTH-12\"");
        let back: StoryId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
