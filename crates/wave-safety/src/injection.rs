// crates/wave-safety/src/injection.rs
// ============================================================================
// Module: Injection Shape Rules
// Description: Flags timing-unsafe credential comparisons, unquoted shell
//              interpolation of secrets, and other language-agnostic
//              injection shapes.
// Purpose: Category 3 of the safety rule taxonomy.
// Dependencies: regex
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;

use wave_core::Violation;
use wave_core::ViolationKind;

fn compiled(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| unreachable!("invalid static regex {pattern:?}: {err}"))
}

struct Pattern {
    regex: &'static Regex,
    penalty: f64,
    description: &'static str,
}

static TIMING_UNSAFE_COMPARE: LazyLock<Regex> =
    LazyLock::new(|| compiled(r"(?i)\b(password|secret|token|api_key|signature)\s*(==|!=)\s*"));

static UNQUOTED_SHELL_INTERP: LazyLock<Regex> = LazyLock::new(|| {
    compiled(r#"(sh|bash|exec|system)\([^)]*\$\{?(PASSWORD|SECRET|TOKEN|API_KEY)\}?[^)]*\)"#)
});

static SQL_STRING_CONCAT: LazyLock<Regex> =
    LazyLock::new(|| compiled(r#"(?i)(SELECT|INSERT|UPDATE|DELETE)\b.*["']\s*\+\s*\w+\s*\+\s*["']"#));

/// Scans `content` for injection-shaped code: timing-unsafe secret
/// comparisons, unquoted shell interpolation of a secret, or string-built SQL.
#[must_use]
pub fn evaluate(content: &str) -> Option<Violation> {
    let patterns = [
        Pattern {
            regex: &UNQUOTED_SHELL_INTERP,
            penalty: 0.4,
            description: "unquoted shell interpolation of a secret-shaped variable",
        },
        Pattern {
            regex: &TIMING_UNSAFE_COMPARE,
            penalty: 0.6,
            description: "timing-unsafe equality comparison against a credential-shaped value",
        },
        Pattern { regex: &SQL_STRING_CONCAT, penalty: 0.5, description: "SQL built by string concatenation" },
    ];

    patterns.iter().find(|pattern| pattern.regex.is_match(content)).map(|pattern| Violation {
        kind: ViolationKind::InjectionShape,
        penalty: pattern.penalty,
        description: pattern.description.to_string(),
    })
}
