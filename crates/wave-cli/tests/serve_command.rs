// crates/wave-cli/tests/serve_command.rs
// ============================================================================
// Module: CLI Serve Command Tests
// Description: Integration tests for the CLI serve command's bind safety check.
// Purpose: Ensure non-loopback binds fail closed before the control surface
//          ever accepts a connection (§6).
// Dependencies: wave-cli binary
// ============================================================================

//! ## Overview
//! Validates that `wave serve` refuses to bind its control surface to a
//! non-loopback address unless the operator opts in.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "test-only output and panic-based assertions are permitted"
)]

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

fn wave_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_wave"))
}

fn temp_root(label: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock drift").as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("wave-cli-{label}-{nanos}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

fn cleanup(path: &PathBuf) {
    let _ = fs::remove_dir_all(path);
}

/// Verifies non-loopback binds are rejected before server startup.
#[test]
fn serve_rejects_non_loopback_bind_without_opt_in() {
    let root = temp_root("serve");
    let config_path = root.join("wave.toml");

    fs::write(&config_path, "[server]\nbind_addr = \"0.0.0.0:0\"\n").expect("write config");

    let output = Command::new(wave_bin())
        .args(["serve", "--config", config_path.to_string_lossy().as_ref()])
        .env_remove("WAVE_ALLOW_NON_LOOPBACK")
        .output()
        .expect("run wave serve");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("non-loopback"), "unexpected stderr: {stderr}");

    cleanup(&root);
}

/// Verifies a missing configuration file is a configuration error (exit 3),
/// not a generic usage error.
#[test]
fn serve_with_missing_config_file_is_exit_three() {
    let output = Command::new(wave_bin())
        .args(["serve", "--config", "/nonexistent/wave.toml"])
        .output()
        .expect("run wave serve");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(3));
}
