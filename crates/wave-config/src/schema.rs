// crates/wave-config/src/schema.rs
// ============================================================================
// Module: Story Schema Validation
// Description: JSON-Schema validation of submitted Story documents, applied
//              before wave-core ever constructs a `Story` value (§6).
// Purpose: Reject a malformed or underspecified Story document fail-closed,
//          at the process boundary, rather than in the middle of `wave-core`
//          deserialization.
// Dependencies: jsonschema, serde_json
// ============================================================================

use jsonschema::Draft;
use serde_json::Value;
use serde_json::json;

/// Returns the JSON Schema (draft 2020-12) a submitted Story document must
/// satisfy, per §6's "Story format" field list.
#[must_use]
pub fn story_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "WAVE Story",
        "type": "object",
        "required": ["id", "title", "domain", "role", "wave", "objective", "acceptance_criteria", "files", "safety", "thresholds"],
        "properties": {
            "id": { "type": "string", "minLength": 1 },
            "title": { "type": "string", "minLength": 1 },
            "domain": { "type": "string", "minLength": 1 },
            "role": { "type": "string", "minLength": 1 },
            "wave": { "type": "integer", "minimum": 1 },
            "objective": {
                "type": "object",
                "required": ["as_a", "i_want", "so_that"],
                "properties": {
                    "as_a": { "type": "string", "minLength": 1 },
                    "i_want": { "type": "string", "minLength": 1 },
                    "so_that": { "type": "string", "minLength": 1 }
                }
            },
            "acceptance_criteria": {
                "type": "array",
                "items": { "type": "string", "minLength": 1 },
                "minItems": 3
            },
            "files": {
                "type": "object",
                "properties": {
                    "create": { "type": "array", "items": { "type": "string" } },
                    "modify": { "type": "array", "items": { "type": "string" } },
                    "forbidden": { "type": "array", "items": { "type": "string" } }
                }
            },
            "safety": {
                "type": "object",
                "required": ["stop_conditions"],
                "properties": {
                    "stop_conditions": {
                        "type": "array",
                        "items": { "type": "string", "minLength": 1 },
                        "minItems": 3
                    }
                }
            },
            "thresholds": {
                "type": "object",
                "required": ["max_tokens", "max_cost", "max_duration_minutes"],
                "properties": {
                    "max_tokens": { "type": "integer", "minimum": 0 },
                    "max_cost": { "type": "number", "minimum": 0 },
                    "max_duration_minutes": { "type": "integer", "minimum": 0 }
                }
            }
        }
    })
}

/// Error returned when a submitted Story document fails schema validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The schema itself failed to compile (programmer error in [`story_schema`]).
    #[error("story schema failed to compile: {0}")]
    SchemaCompile(String),
    /// The submitted document does not satisfy the schema.
    #[error("story document failed schema validation: {0}")]
    Invalid(String),
}

/// A compiled validator over [`story_schema`], reused across every Story
/// submission in a process rather than recompiled per call.
pub struct StoryValidator {
    validator: jsonschema::Validator,
}

impl StoryValidator {
    /// Compiles the Story schema.
    ///
    /// # Errors
    /// Returns [`SchemaError::SchemaCompile`] if the schema document itself
    /// is malformed (this would indicate a bug in [`story_schema`]).
    pub fn new() -> Result<Self, SchemaError> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&story_schema())
            .map_err(|err| SchemaError::SchemaCompile(err.to_string()))?;
        Ok(Self { validator })
    }

    /// Validates `document` against the Story schema, collecting every
    /// violation rather than stopping at the first one, so an operator
    /// submitting a hand-authored Story sees the whole list at once.
    ///
    /// # Errors
    /// Returns [`SchemaError::Invalid`] describing every violated path if
    /// `document` does not satisfy the schema.
    pub fn validate(&self, document: &Value) -> Result<(), SchemaError> {
        let errors: Vec<String> = self.validator.iter_errors(document).map(|err| err.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn valid_story() -> Value {
        json!({
            "id": "AUTH-1",
            "title": "Login flow",
            "domain": "AUTH",
            "role": "backend-1",
            "wave": 1,
            "objective": { "as_a": "user", "i_want": "to log in", "so_that": "I can access my account" },
            "acceptance_criteria": ["a", "b", "c"],
            "files": { "create": ["src/auth/"], "modify": [], "forbidden": [] },
            "safety": { "stop_conditions": ["a", "b", "c"] },
            "thresholds": { "max_tokens": 100_000, "max_cost": 5.0, "max_duration_minutes": 30 }
        })
    }

    #[test]
    fn valid_story_passes() {
        let validator = StoryValidator::new().expect("compile schema");
        assert!(validator.validate(&valid_story()).is_ok());
    }

    #[test]
    fn story_missing_required_field_is_rejected() {
        let validator = StoryValidator::new().expect("compile schema");
        let mut story = valid_story();
        story.as_object_mut().expect("object").remove("domain");
        let err = validator.validate(&story).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid(_)));
    }

    #[test]
    fn story_with_too_few_acceptance_criteria_is_rejected() {
        let validator = StoryValidator::new().expect("compile schema");
        let mut story = valid_story();
        story["acceptance_criteria"] = json!(["only one"]);
        assert!(validator.validate(&story).is_err());
    }

    #[test]
    fn story_with_too_few_stop_conditions_is_rejected() {
        let validator = StoryValidator::new().expect("compile schema");
        let mut story = valid_story();
        story["safety"]["stop_conditions"] = json!(["only one", "two"]);
        assert!(validator.validate(&story).is_err());
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let validator = StoryValidator::new().expect("compile schema");
        let mut story = valid_story();
        story["thresholds"]["max_tokens"] = json!(-1);
        assert!(validator.validate(&story).is_err());
    }
}
