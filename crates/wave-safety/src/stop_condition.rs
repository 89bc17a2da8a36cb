// crates/wave-safety/src/stop_condition.rs
// ============================================================================
// Module: Stop-Condition Rule
// Description: Evaluates a story's declared stop-conditions against observed
//              content, reusing the tri-state requirement evaluator also used
//              for acceptance criteria.
// Purpose: Category 5 of the safety rule taxonomy: an immediate, maximum-
//          penalty block the moment any stop-condition is observed to hold.
// Dependencies: ret_logic::{Requirement, TriState}
// ============================================================================

use ret_logic::Requirement;
use ret_logic::TriState;

use wave_core::Violation;
use wave_core::ViolationKind;

/// Returns `true` iff every significant (length > 3) word of `phrase`
/// appears, case-insensitively, somewhere in `content`.
///
/// This is the evidence resolver for stop-condition phrases: until the
/// dispatcher wires a richer evidence source (structured test results, a
/// diff summary), a keyword-containment heuristic is the resolver every
/// stop-condition phrase is checked against.
fn phrase_observed(content_lower: &str, phrase: &str) -> TriState {
    let significant: Vec<String> =
        phrase.split_whitespace().map(str::to_lowercase).filter(|word| word.len() > 3).collect();
    if significant.is_empty() {
        return TriState::Unknown;
    }
    if significant.iter().all(|word| content_lower.contains(word.as_str())) {
        TriState::True
    } else {
        TriState::False
    }
}

/// Evaluates `stop_conditions` against `content`, returning a violation the
/// moment any one of them is observed to hold.
#[must_use]
pub fn evaluate(content: &str, stop_conditions: &[String]) -> Option<Violation> {
    if stop_conditions.is_empty() {
        return None;
    }
    let content_lower = content.to_lowercase();
    let requirement = Requirement::or(stop_conditions.iter().cloned().map(Requirement::condition).collect());

    let hit = requirement.evaluate(&|phrase: &String| phrase_observed(&content_lower, phrase));
    if hit == TriState::True {
        let hit_phrase = stop_conditions
            .iter()
            .find(|phrase| phrase_observed(&content_lower, phrase) == TriState::True)
            .cloned()
            .unwrap_or_default();
        Some(Violation {
            kind: ViolationKind::StopConditionHit,
            penalty: 0.0,
            description: format!("stop-condition observed to hold: {hit_phrase}"),
        })
    } else {
        None
    }
}
