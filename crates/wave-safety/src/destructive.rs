// crates/wave-safety/src/destructive.rs
// ============================================================================
// Module: Destructive Operation Rules
// Description: Flags recursive deletion/overwrite of system paths, format
//              commands, fork bombs, and world-writable root permission
//              changes, with a benign-scoped-deletion allow-list.
// Purpose: Category 1 of the safety rule taxonomy.
// Dependencies: regex
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;

use wave_core::Violation;
use wave_core::ViolationKind;

struct Pattern {
    regex: &'static Regex,
    penalty: f64,
    description: &'static str,
}

/// Compiles a pattern known at compile time to be valid; a failure here
/// indicates a typo in a literal pattern, not a runtime condition.
fn compiled(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| unreachable!("invalid static regex {pattern:?}: {err}"))
}

static RM_RF_ROOT: LazyLock<Regex> =
    LazyLock::new(|| compiled(r"rm\s+-[a-z]*r[a-z]*f[a-z]*\s+(/|~|/home|/etc|/usr|/var)(\s|$)"));
static RM_RF_ANY: LazyLock<Regex> = LazyLock::new(|| compiled(r"rm\s+-[a-z]*r[a-z]*f[a-z]*\s"));
static FORMAT_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| compiled(r"(?i)\b(mkfs(\.\w+)?|fdisk|dd\s+if=.*of=/dev/)\b"));
static FORK_BOMB: LazyLock<Regex> = LazyLock::new(|| compiled(r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:"));
static WORLD_WRITABLE_ROOT: LazyLock<Regex> = LazyLock::new(|| compiled(r"chmod\s+-R?\s*777\s+/(\s|$)"));

static BENIGN_SCOPE: LazyLock<Regex> = LazyLock::new(|| {
    compiled(r"rm\s+-[a-z]*r[a-z]*f[a-z]*\s+(\./|\.\./|node_modules|target|dist|build|\$\{?TMPDIR|/tmp)")
});

/// Scans `content` for destructive operations on system paths.
///
/// Returns `None` if the deletion is scoped to a benign path (current
/// directory, temp directory, build outputs, dependency caches) even when it
/// also matches a broader destructive pattern.
#[must_use]
pub fn evaluate(content: &str) -> Option<Violation> {
    if BENIGN_SCOPE.is_match(content) {
        return None;
    }

    let patterns = [
        Pattern { regex: &RM_RF_ROOT, penalty: 0.10, description: "recursive force-delete of a system root path" },
        Pattern { regex: &FORK_BOMB, penalty: 0.05, description: "shell fork bomb" },
        Pattern { regex: &FORMAT_COMMAND, penalty: 0.08, description: "filesystem format or raw device write" },
        Pattern { regex: &WORLD_WRITABLE_ROOT, penalty: 0.10, description: "world-writable permission change on root" },
        Pattern { regex: &RM_RF_ANY, penalty: 0.20, description: "recursive force-delete outside the benign allow-list" },
    ];

    patterns.iter().find(|pattern| pattern.regex.is_match(content)).map(|pattern| Violation {
        kind: ViolationKind::DestructiveOperation,
        penalty: pattern.penalty,
        description: pattern.description.to_string(),
    })
}
