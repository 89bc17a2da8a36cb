// crates/wave-dispatch/src/worker/process.rs
// ============================================================================
// Module: Process Worker
// Description: A `Worker` implementation that invokes the external,
//              LLM-driven code-generating process as a subprocess, one turn
//              per line-delimited JSON request/response pair over stdio.
// Purpose: Give the dispatcher a real backend for the capability this crate
//          explicitly treats as out of scope to implement itself (§1): WAVE
//          only needs to invoke it, read its turns, and kill it.
// Dependencies: tokio::process, serde_json, wave-core::capability::Worker
// ============================================================================

use std::process::Stdio;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;

use wave_core::Story;
use wave_core::Worker;
use wave_core::WorkerError;
use wave_core::WorkerExit;
use wave_core::WorkerTurn;

/// One line-delimited JSON request sent to the worker process on its stdin.
#[derive(Debug, Serialize)]
struct TurnRequest<'a> {
    story_id: &'a str,
    role: &'a str,
    context: &'a Value,
}

/// One line-delimited JSON response read from the worker process's stdout.
#[derive(Debug, Deserialize)]
struct TurnResponse {
    narration: String,
    #[serde(default)]
    proposed_writes: Vec<(String, String)>,
    #[serde(default)]
    proposed_commands: Vec<String>,
    tokens_in: u64,
    tokens_out: u64,
    done: bool,
}

/// A [`Worker`] that spawns `command` once per dispatch and exchanges one
/// line-delimited JSON object per turn over the child's stdin/stdout.
///
/// # Invariants
/// - At most one child process is live per `ProcessWorker` instance at a
///   time; [`Worker::kill`] is always safe to call, even after the child has
///   already exited on its own.
pub struct ProcessWorker {
    command: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ProcessWorker {
    /// Builds a worker that spawns `command args...` fresh for the first
    /// turn of each dispatch and reuses the same child for subsequent turns.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self { command: command.into(), args, child: Mutex::new(None) }
    }

    async fn ensure_spawned(&self) -> Result<(), WorkerError> {
        let already_spawned = self.child.lock().unwrap_or_else(PoisonError::into_inner).is_some();
        if already_spawned {
            return Ok(());
        }
        let child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| WorkerError::ProcessFailure(err.to_string()))?;
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
        Ok(())
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn invoke(&self, story: &Story, role: &str, context: &Value) -> Result<WorkerTurn, WorkerError> {
        self.ensure_spawned().await?;

        let request = TurnRequest { story_id: story.id.as_str(), role, context };
        let mut line = serde_json::to_string(&request).map_err(|err| WorkerError::MalformedOutput(err.to_string()))?;
        line.push('\n');

        let response_line = {
            let mut guard = self.child.lock().unwrap_or_else(PoisonError::into_inner);
            let child = guard.as_mut().ok_or_else(|| WorkerError::ProcessFailure("worker process not running".to_string()))?;
            let stdin = child.stdin.as_mut().ok_or_else(|| WorkerError::ProcessFailure("worker stdin unavailable".to_string()))?;
            stdin.write_all(line.as_bytes()).await.map_err(|err| WorkerError::ProcessFailure(err.to_string()))?;
            stdin.flush().await.map_err(|err| WorkerError::ProcessFailure(err.to_string()))?;

            let stdout = child.stdout.as_mut().ok_or_else(|| WorkerError::ProcessFailure("worker stdout unavailable".to_string()))?;
            let mut reader = BufReader::new(stdout);
            let mut response_line = String::new();
            let bytes_read =
                reader.read_line(&mut response_line).await.map_err(|err| WorkerError::ProcessFailure(err.to_string()))?;
            if bytes_read == 0 {
                return Err(WorkerError::ProcessFailure("worker process closed stdout".to_string()));
            }
            response_line
        };

        let response: TurnResponse =
            serde_json::from_str(response_line.trim()).map_err(|err| WorkerError::MalformedOutput(err.to_string()))?;

        Ok(WorkerTurn {
            narration: response.narration,
            proposed_writes: response.proposed_writes,
            proposed_commands: response.proposed_commands,
            tokens_in: response.tokens_in,
            tokens_out: response.tokens_out,
            done: response.done,
        })
    }

    async fn kill(&self) -> WorkerExit {
        let child = self.child.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut child) = child else {
            return WorkerExit::Completed;
        };
        match child.try_wait() {
            Ok(Some(status)) if status.success() => WorkerExit::Completed,
            Ok(Some(_)) => WorkerExit::Crashed,
            _ => {
                let _ = child.kill().await;
                WorkerExit::Killed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kill_on_never_spawned_worker_is_a_safe_no_op() {
        let worker = ProcessWorker::new("true", vec![]);
        assert_eq!(worker.kill().await, WorkerExit::Completed);
    }

    #[tokio::test]
    async fn invoking_a_nonexistent_binary_is_a_process_failure() {
        let worker = ProcessWorker::new("wave-nonexistent-worker-binary", vec![]);
        let story = wave_core::Story {
            id: wave_core::StoryId::new("AUTH-1"),
            project: wave_core::ProjectId::new("demo"),
            title: "t".to_string(),
            domain: wave_core::Domain::new("AUTH"),
            role: wave_core::Role::new("backend-1"),
            wave: 1,
            objective: wave_core::Objective { as_a: "u".to_string(), i_want: "x".to_string(), so_that: "y".to_string() },
            acceptance_criteria: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            files: wave_core::FilePolicy::default(),
            stop_conditions: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            thresholds: wave_core::StoryThresholds { max_tokens: 1, max_cost_micros: 1, max_duration_minutes: 1 },
        };
        let err = worker.invoke(&story, "backend-1", &serde_json::Value::Null).await.unwrap_err();
        assert!(matches!(err, WorkerError::ProcessFailure(_)));
    }
}
