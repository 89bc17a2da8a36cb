// crates/wave-dispatch/src/emergency.rs
// ============================================================================
// Module: Emergency Stop
// Description: The operator-triggered, idempotent abort signal checked
//              before every dispatch and between every worker turn.
// Purpose: Implement §6's "Emergency stop file": a sentinel file at a
//          well-known path in the session's working directory whose
//          non-empty content triggers emergency stop on the next check, plus
//          an in-memory flag the control surface can set directly without
//          touching the filesystem.
// Dependencies: std::sync::atomic, std::fs
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// A checkable, idempotent emergency-stop flag for one session.
///
/// Two independent triggers set the same flag: an operator calling the
/// `emergency-stop` control-surface RPC (in-memory, via [`EmergencyStop::set`])
/// and a sentinel file appearing with non-empty content in the session's
/// working directory (checked lazily by [`EmergencyStop::is_set`], since the
/// dispatcher must re-check it between every worker turn without paying for
/// a `stat` syscall when no sentinel path is configured at all).
#[derive(Debug)]
pub struct EmergencyStop {
    flag: AtomicBool,
    sentinel_path: Option<PathBuf>,
}

impl EmergencyStop {
    /// Builds a watcher over an optional sentinel file path.
    #[must_use]
    pub fn new(sentinel_path: Option<PathBuf>) -> Self {
        Self { flag: AtomicBool::new(false), sentinel_path }
    }

    /// Builds a watcher with no sentinel file, never set unless [`Self::set`] is called.
    #[must_use]
    pub fn never() -> Self {
        Self::new(None)
    }

    /// Builds a watcher that is already set, for tests exercising the
    /// "observed before every dispatch" cancellation path.
    #[must_use]
    pub fn already_set() -> Self {
        let stop = Self::new(None);
        stop.set();
        stop
    }

    /// Sets the in-memory flag. Idempotent: calling this repeatedly leaves
    /// the flag set and does not re-trigger any caller-visible effect beyond
    /// what the first call already did (§8: "repeated invocations produce
    /// the same final state").
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` iff the in-memory flag is set or, when a sentinel path
    /// is configured, the sentinel file exists with non-empty content.
    #[must_use]
    pub fn is_set(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.sentinel_path.as_deref().is_some_and(sentinel_non_empty)
    }
}

fn sentinel_non_empty(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|metadata| metadata.len() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_is_never_set_without_an_explicit_call() {
        let stop = EmergencyStop::never();
        assert!(!stop.is_set());
    }

    #[test]
    fn set_is_idempotent() {
        let stop = EmergencyStop::never();
        stop.set();
        stop.set();
        assert!(stop.is_set());
    }

    #[test]
    fn empty_sentinel_file_does_not_trigger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("STOP");
        std::fs::write(&path, b"").expect("write empty file");
        let stop = EmergencyStop::new(Some(path));
        assert!(!stop.is_set());
    }

    #[test]
    fn non_empty_sentinel_file_triggers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("STOP");
        std::fs::write(&path, b"operator requested stop").expect("write sentinel");
        let stop = EmergencyStop::new(Some(path));
        assert!(stop.is_set());
    }

    #[test]
    fn missing_sentinel_file_does_not_trigger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("does-not-exist");
        let stop = EmergencyStop::new(Some(path));
        assert!(!stop.is_set());
    }
}
