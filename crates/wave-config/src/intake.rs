// crates/wave-config/src/intake.rs
// ============================================================================
// Module: Story Intake
// Description: Converts a schema-validated Story JSON document (§6) into a
//              `wave_core::Story` value.
// Purpose: Give the control surface one place that turns an untrusted wire
//          document into the typed value the rest of the workspace consumes,
//          after `StoryValidator` has already confirmed it satisfies the
//          schema's required fields and minima.
// Dependencies: wave-core, serde_json
// ============================================================================

use serde_json::Value;
use wave_core::Domain;
use wave_core::FilePolicy;
use wave_core::Objective;
use wave_core::ProjectId;
use wave_core::Role;
use wave_core::Story;
use wave_core::StoryId;
use wave_core::StoryThresholds;

/// Error converting a schema-valid Story document into a [`Story`] value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    /// A field the schema requires was missing or of the wrong shape; this
    /// should not happen for a document [`crate::StoryValidator`] already
    /// accepted, and indicates a schema/intake drift bug.
    #[error("story document missing or malformed field: {0}")]
    MalformedField(String),
}

/// Converts a Story JSON document, already confirmed to satisfy
/// [`crate::story_schema`], into a [`Story`] owned by `project`.
///
/// `max_cost` in the wire format is USD (a float); it is converted to
/// micro-dollars (1e-6 USD) by rounding to the nearest integer, matching the
/// precision [`wave_core::StoryThresholds::max_cost_micros`] is denominated in.
///
/// # Errors
/// Returns [`IntakeError`] if a required field is absent or the wrong JSON
/// type, which indicates the caller skipped schema validation.
pub fn story_from_document(project: &ProjectId, document: &Value) -> Result<Story, IntakeError> {
    let field_str = |path: &str| -> Result<String, IntakeError> {
        document.get(path).and_then(Value::as_str).map(str::to_string).ok_or_else(|| IntakeError::MalformedField(path.to_string()))
    };
    let objective = document.get("objective").ok_or_else(|| IntakeError::MalformedField("objective".to_string()))?;
    let objective_field = |key: &str| -> Result<String, IntakeError> {
        objective.get(key).and_then(Value::as_str).map(str::to_string).ok_or_else(|| IntakeError::MalformedField(format!("objective.{key}")))
    };
    let acceptance_criteria = document
        .get("acceptance_criteria")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>())
        .ok_or_else(|| IntakeError::MalformedField("acceptance_criteria".to_string()))?;
    let string_list = |parent: &str, key: &str| -> Vec<String> {
        document
            .get(parent)
            .and_then(|value| value.get(key))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };
    let wave = document.get("wave").and_then(Value::as_u64).ok_or_else(|| IntakeError::MalformedField("wave".to_string()))?;
    let max_tokens = document
        .get("thresholds")
        .and_then(|value| value.get("max_tokens"))
        .and_then(Value::as_u64)
        .ok_or_else(|| IntakeError::MalformedField("thresholds.max_tokens".to_string()))?;
    let max_cost = document
        .get("thresholds")
        .and_then(|value| value.get("max_cost"))
        .and_then(Value::as_f64)
        .ok_or_else(|| IntakeError::MalformedField("thresholds.max_cost".to_string()))?;
    let max_duration_minutes = document
        .get("thresholds")
        .and_then(|value| value.get("max_duration_minutes"))
        .and_then(Value::as_u64)
        .ok_or_else(|| IntakeError::MalformedField("thresholds.max_duration_minutes".to_string()))?;

    Ok(Story {
        id: StoryId::new(field_str("id")?),
        project: project.clone(),
        title: field_str("title")?,
        domain: Domain::new(field_str("domain")?),
        role: Role::new(field_str("role")?),
        wave: u32::try_from(wave).unwrap_or(u32::MAX),
        objective: Objective { as_a: objective_field("as_a")?, i_want: objective_field("i_want")?, so_that: objective_field("so_that")? },
        acceptance_criteria,
        files: FilePolicy {
            create: string_list("files", "create"),
            modify: string_list("files", "modify"),
            forbidden: string_list("files", "forbidden"),
        },
        stop_conditions: string_list("safety", "stop_conditions"),
        thresholds: StoryThresholds {
            max_tokens,
            max_cost_micros: (max_cost * 1_000_000.0).round().max(0.0) as u64,
            max_duration_minutes: u32::try_from(max_duration_minutes).unwrap_or(u32::MAX),
        },
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn document() -> Value {
        json!({
            "id": "AUTH-1",
            "title": "Login flow",
            "domain": "AUTH",
            "role": "backend-1",
            "wave": 1,
            "objective": { "as_a": "user", "i_want": "to log in", "so_that": "I can access my account" },
            "acceptance_criteria": ["a", "b", "c"],
            "files": { "create": ["src/auth/"], "modify": [], "forbidden": ["src/billing/"] },
            "safety": { "stop_conditions": ["a", "b", "c"] },
            "thresholds": { "max_tokens": 100_000, "max_cost": 5.25, "max_duration_minutes": 30 }
        })
    }

    #[test]
    fn converts_every_field() {
        let story = story_from_document(&ProjectId::new("demo"), &document()).expect("convert");
        assert_eq!(story.id.as_str(), "AUTH-1");
        assert_eq!(story.project.as_str(), "demo");
        assert_eq!(story.domain.as_str(), "AUTH");
        assert_eq!(story.role.as_str(), "backend-1");
        assert_eq!(story.wave, 1);
        assert_eq!(story.acceptance_criteria.len(), 3);
        assert_eq!(story.files.forbidden, vec!["src/billing/".to_string()]);
        assert_eq!(story.thresholds.max_cost_micros, 5_250_000);
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let mut document = document();
        document.as_object_mut().expect("object").remove("domain");
        let err = story_from_document(&ProjectId::new("demo"), &document).unwrap_err();
        assert!(matches!(err, IntakeError::MalformedField(field) if field == "domain"));
    }
}
