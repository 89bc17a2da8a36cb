// crates/wave-cli/src/serve_policy.rs
// ============================================================================
// Module: Serve Policy
// Description: Network exposure policy checks for the `wave serve` launcher.
// Purpose: Enforce safe-by-default bind behavior with explicit opt-in before
//          the control surface ever accepts a connection.
// Dependencies: std::net, std::env
// ============================================================================

//! ## Overview
//! `wave serve` binds an HTTP control surface carrying session-control
//! operations (§6), including `emergency-stop`. A bind address reachable
//! from outside the host is refused unless the operator explicitly opts in
//! via [`ALLOW_NON_LOOPBACK_ENV`]; this mirrors the control plane's
//! fail-closed posture for every other boundary (safety, budget, gates).

use std::env;
use std::net::SocketAddr;

/// Environment variable enabling non-loopback server binds.
pub const ALLOW_NON_LOOPBACK_ENV: &str = "WAVE_ALLOW_NON_LOOPBACK";

/// The resolved bind decision for one `wave serve` invocation.
#[derive(Debug, Clone, Copy)]
pub struct BindOutcome {
    /// The socket address the server will bind to.
    pub bind_addr: SocketAddr,
    /// `true` iff the address is reachable from outside this host.
    pub network_exposed: bool,
}

/// Error preventing a bind from proceeding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServePolicyError {
    /// The configured bind address could not be parsed.
    #[error("invalid bind address {bind}: {reason}")]
    InvalidBind {
        /// The offending address string.
        bind: String,
        /// Why it failed to parse.
        reason: String,
    },
    /// A non-loopback bind was requested without the opt-in environment variable set.
    #[error("bind address {bind} is non-loopback; set {ALLOW_NON_LOOPBACK_ENV}=1 to allow")]
    NonLoopbackOptInRequired {
        /// The non-loopback address that was rejected.
        bind: String,
    },
}

/// Resolves whether `WAVE_ALLOW_NON_LOOPBACK` is set to a truthy value in
/// the process environment.
#[must_use]
pub fn resolve_allow_non_loopback() -> bool {
    env::var(ALLOW_NON_LOOPBACK_ENV).is_ok_and(|value| value == "1" || value.eq_ignore_ascii_case("true"))
}

/// Validates `bind` against the loopback-only default, fail-closed.
///
/// # Errors
/// Returns [`ServePolicyError::InvalidBind`] if `bind` is not a valid socket
/// address, or [`ServePolicyError::NonLoopbackOptInRequired`] if it is
/// non-loopback and `allow_non_loopback` is `false`.
pub fn enforce_local_only(bind: &str, allow_non_loopback: bool) -> Result<BindOutcome, ServePolicyError> {
    let bind_addr: SocketAddr = bind.parse().map_err(|err: std::net::AddrParseError| ServePolicyError::InvalidBind { bind: bind.to_string(), reason: err.to_string() })?;
    let network_exposed = !bind_addr.ip().is_loopback();
    if network_exposed && !allow_non_loopback {
        return Err(ServePolicyError::NonLoopbackOptInRequired { bind: bind.to_string() });
    }
    Ok(BindOutcome { bind_addr, network_exposed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_bind_is_always_allowed() {
        let outcome = enforce_local_only("127.0.0.1:7878", false).expect("loopback allowed");
        assert!(!outcome.network_exposed);
    }

    #[test]
    fn non_loopback_bind_requires_opt_in() {
        let err = enforce_local_only("0.0.0.0:7878", false).unwrap_err();
        assert!(matches!(err, ServePolicyError::NonLoopbackOptInRequired { .. }));
    }

    #[test]
    fn non_loopback_bind_allowed_with_opt_in() {
        let outcome = enforce_local_only("0.0.0.0:7878", true).expect("opted in");
        assert!(outcome.network_exposed);
    }

    #[test]
    fn malformed_bind_is_invalid() {
        let err = enforce_local_only("not-an-address", false).unwrap_err();
        assert!(matches!(err, ServePolicyError::InvalidBind { .. }));
    }
}
