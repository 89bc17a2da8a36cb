// crates/ret-logic/tests/tristate.rs
// ============================================================================
// Module: Tri-State Tests
// Description: Black-box coverage of Kleene logic tables through the public API.
// Purpose: Lock down the truth tables independent of internal representation.
// Dependencies: ret_logic::TriState
// ============================================================================

use ret_logic::TriState;

#[test]
fn negation_truth_table() {
    assert_eq!(TriState::True.negate(), TriState::False);
    assert_eq!(TriState::False.negate(), TriState::True);
    assert_eq!(TriState::Unknown.negate(), TriState::Unknown);
}

#[test]
fn conjunction_truth_table() {
    use TriState::{False, True, Unknown};
    assert_eq!(TriState::all([True, True]), True);
    assert_eq!(TriState::all([True, False]), False);
    assert_eq!(TriState::all([True, Unknown]), Unknown);
    assert_eq!(TriState::all([False, Unknown]), False);
    assert_eq!(TriState::all(std::iter::empty()), True);
}

#[test]
fn disjunction_truth_table() {
    use TriState::{False, True, Unknown};
    assert_eq!(TriState::any([False, False]), False);
    assert_eq!(TriState::any([True, False]), True);
    assert_eq!(TriState::any([False, Unknown]), Unknown);
    assert_eq!(TriState::any([True, Unknown]), True);
    assert_eq!(TriState::any(std::iter::empty()), False);
}
