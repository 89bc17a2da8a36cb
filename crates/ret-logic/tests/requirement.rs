// crates/ret-logic/tests/requirement.rs
// ============================================================================
// Module: Requirement Tree Tests
// Description: Integration coverage for Requirement construction and evaluation.
// Purpose: Validate the public builder API and tri-state propagation across
//          nested combinators.
// Dependencies: ret_logic::Requirement, ret_logic::TriState
// ============================================================================

#![allow(clippy::expect_used, reason = "test assertions are allowed to expect")]

use ret_logic::Requirement;
use ret_logic::TriState;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
enum Cond {
    TestsPass,
    NoOpenFindings,
    ReviewerApproved,
}

fn resolve(cond: &Cond) -> TriState {
    match cond {
        Cond::TestsPass => TriState::True,
        Cond::NoOpenFindings => TriState::Unknown,
        Cond::ReviewerApproved => TriState::False,
    }
}

#[test]
fn all_with_unknown_member_stays_unknown_unless_false_present() {
    let req = Requirement::and(vec![
        Requirement::condition(Cond::TestsPass),
        Requirement::condition(Cond::NoOpenFindings),
    ]);
    assert_eq!(req.evaluate(&resolve), TriState::Unknown);
}

#[test]
fn all_short_circuits_to_false_even_with_unknowns_present() {
    let req = Requirement::and(vec![
        Requirement::condition(Cond::NoOpenFindings),
        Requirement::condition(Cond::ReviewerApproved),
    ]);
    assert_eq!(req.evaluate(&resolve), TriState::False);
}

#[test]
fn require_group_resolves_once_enough_members_are_false() {
    let req = Requirement::require_group(
        2,
        vec![
            Requirement::condition(Cond::ReviewerApproved),
            Requirement::condition(Cond::NoOpenFindings),
        ],
    );
    assert_eq!(req.evaluate(&resolve), TriState::False);
}

#[test]
fn serde_roundtrip_preserves_tree_shape() {
    let req = Requirement::and(vec![
        Requirement::condition(Cond::TestsPass),
        Requirement::negate(Requirement::condition(Cond::ReviewerApproved)),
    ]);
    let json = serde_json::to_string(&req).expect("serialize");
    let back: Requirement<Cond> = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(req, back);
}
