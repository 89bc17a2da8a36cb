// crates/wave-store/src/sqlite.rs
// ============================================================================
// Module: SQLite Store and Bus
// Description: The durable checkpoint store (C2) and signal bus (C1),
//              sharing one writer thread and SQLite connection.
// Purpose: Give the session orchestrator crash-recoverable persistence:
//          checkpoints survive a process restart, and the signal log can be
//          replayed from any prior sequence (§4.1, §4.2, §8 scenario S6).
// Dependencies: crate::writer, rusqlite, serde_json, wave-core
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use tracing::debug;

use wave_core::Bus;
use wave_core::BusError;
use wave_core::Checkpoint;
use wave_core::ContextSummary;
use wave_core::Gate;
use wave_core::OutstandingDispatch;
use wave_core::Sequence;
use wave_core::SessionId;
use wave_core::Signal;
use wave_core::SignalId;
use wave_core::SignalKind;
use wave_core::Store;
use wave_core::StoreError;
use wave_core::StoryId;

use crate::writer::WriterError;
use crate::writer::WriterHandle;

/// How many checkpoints are retained per session (§4.2 retention policy).
const RETAINED_CHECKPOINTS_PER_SESSION: i64 = 5;

/// The key [`Checkpoint::extra`] carries session-status updates under, read
/// by [`SqliteStore::save_checkpoint`] to keep the side `sessions` table (used
/// by [`Store::list_resumable_sessions`]) current without a separate write
/// path. A checkpoint that omits this key leaves the session's recorded
/// status unchanged.
pub const SESSION_STATUS_EXTRA_KEY: &str = "session_status";

/// Error opening or operating a SQLite-backed store or bus.
#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    /// The writer thread could not be started or has exited.
    #[error(transparent)]
    Writer(#[from] WriterError),
    /// A migration or query failed at the SQLite layer.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

fn store_unavailable(err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn bus_unavailable(err: impl std::fmt::Display) -> BusError {
    BusError::Unavailable(err.to_string())
}

fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS checkpoints (
            session_id TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            gate TEXT NOT NULL,
            per_story_gate TEXT NOT NULL,
            budget TEXT NOT NULL,
            outstanding_dispatches TEXT NOT NULL,
            context_summary TEXT NOT NULL,
            extra TEXT NOT NULL,
            created_at_millis INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            PRIMARY KEY (session_id, sequence)
        );

        CREATE TABLE IF NOT EXISTS signals (
            id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            story_id TEXT,
            kind TEXT NOT NULL,
            producer TEXT NOT NULL,
            timestamp_millis INTEGER NOT NULL,
            payload TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            PRIMARY KEY (session_id, sequence)
        );
        CREATE INDEX IF NOT EXISTS signals_by_id ON signals (id);

        CREATE TABLE IF NOT EXISTS bus_ack (
            session_id TEXT PRIMARY KEY,
            acked_sequence INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            latest_sequence INTEGER NOT NULL
        );
        ",
    )
}

/// Opens (creating if absent) a SQLite-backed store and bus sharing one
/// writer thread and connection, per the single-writer-gateway pattern.
///
/// # Errors
/// Returns [`SqliteStoreError`] if the connection cannot be opened,
/// configured, or migrated.
pub fn open(path: impl AsRef<std::path::Path>) -> Result<(SqliteStore, SqliteBus), SqliteStoreError> {
    let writer = Arc::new(WriterHandle::open_with_init(path, |conn| run_migrations(conn))?);
    Ok((SqliteStore { writer: Arc::clone(&writer) }, SqliteBus { writer }))
}

/// Opens an in-memory SQLite-backed store and bus, for tests that want real
/// SQLite semantics (foreign keys, transactions) without a file on disk.
///
/// # Errors
/// Returns [`SqliteStoreError`] if the connection cannot be configured or migrated.
pub fn open_in_memory() -> Result<(SqliteStore, SqliteBus), SqliteStoreError> {
    let writer = Arc::new(WriterHandle::open_with_init(":memory:", |conn| run_migrations(conn))?);
    Ok((SqliteStore { writer: Arc::clone(&writer) }, SqliteBus { writer }))
}

/// The durable checkpoint store (C2), backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    writer: Arc<WriterHandle>,
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_checkpoint(&self, checkpoint: Checkpoint, triggering_signal: &Signal) -> Result<Sequence, StoreError> {
        let content_hash = checkpoint.content_hash();
        let session_status = checkpoint.extra.get(SESSION_STATUS_EXTRA_KEY).and_then(|value| value.as_str()).map(str::to_string);

        let session_id = checkpoint.session_id.clone();
        let sequence = checkpoint.sequence;
        let signal = triggering_signal.clone();

        let result = self
            .writer
            .submit(move |conn| -> rusqlite::Result<()> {
                let tx = conn.transaction()?;
                {
                    let per_story_gate = serde_json::to_string(&checkpoint.per_story_gate).unwrap_or_default();
                    let budget = serde_json::to_string(&checkpoint.budget).unwrap_or_default();
                    let outstanding = serde_json::to_string(&checkpoint.outstanding_dispatches).unwrap_or_default();
                    let context_summary = serde_json::to_string(&checkpoint.context_summary).unwrap_or_default();
                    let extra = serde_json::to_string(&checkpoint.extra).unwrap_or_default();

                    tx.execute(
                        "INSERT INTO checkpoints
                            (session_id, sequence, gate, per_story_gate, budget, outstanding_dispatches, context_summary, extra, created_at_millis, content_hash)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                        params![
                            checkpoint.session_id.as_str(),
                            checkpoint.sequence.get() as i64,
                            checkpoint.gate.name(),
                            per_story_gate,
                            budget,
                            outstanding,
                            context_summary,
                            extra,
                            checkpoint.created_at.as_unix_millis(),
                            content_hash,
                        ],
                    )?;

                    let payload = serde_json::to_string(&signal.payload).unwrap_or_default();
                    tx.execute(
                        "INSERT OR IGNORE INTO signals (id, session_id, story_id, kind, producer, timestamp_millis, payload, sequence)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            signal.id.as_str(),
                            signal.session_id.as_str(),
                            signal.story_id.as_ref().map(StoryId::as_str),
                            signal_kind_wire(&signal.kind),
                            signal.producer,
                            signal.timestamp.as_unix_millis(),
                            payload,
                            signal.sequence.get() as i64,
                        ],
                    )?;

                    tx.execute(
                        "DELETE FROM checkpoints
                         WHERE session_id = ?1 AND sequence NOT IN (
                             SELECT sequence FROM checkpoints WHERE session_id = ?1 ORDER BY sequence DESC LIMIT ?2
                         )",
                        params![checkpoint.session_id.as_str(), RETAINED_CHECKPOINTS_PER_SESSION],
                    )?;

                    if let Some(status) = &session_status {
                        tx.execute(
                            "INSERT INTO sessions (session_id, status, latest_sequence) VALUES (?1, ?2, ?3)
                             ON CONFLICT(session_id) DO UPDATE SET status = excluded.status, latest_sequence = excluded.latest_sequence",
                            params![checkpoint.session_id.as_str(), status, checkpoint.sequence.get() as i64],
                        )?;
                    } else {
                        tx.execute(
                            "UPDATE sessions SET latest_sequence = ?2 WHERE session_id = ?1",
                            params![checkpoint.session_id.as_str(), checkpoint.sequence.get() as i64],
                        )?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(store_unavailable)?;

        result.map_err(store_unavailable)?;
        debug!(session_id = session_id.as_str(), sequence = sequence.get(), "checkpoint saved");
        Ok(sequence)
    }

    async fn load_latest(&self, session_id: &SessionId) -> Result<Option<(Checkpoint, Vec<Signal>)>, StoreError> {
        let session_id = session_id.clone();
        let row = self
            .writer
            .submit(move |conn| -> rusqlite::Result<Option<CheckpointRow>> {
                conn.query_row(
                    "SELECT session_id, sequence, gate, per_story_gate, budget, outstanding_dispatches, context_summary, extra, created_at_millis, content_hash
                     FROM checkpoints WHERE session_id = ?1 ORDER BY sequence DESC LIMIT 1",
                    params![session_id.as_str()],
                    CheckpointRow::from_row,
                )
                .optional()
            })
            .await
            .map_err(store_unavailable)?
            .map_err(store_unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let checkpoint = row.into_checkpoint().map_err(|reason| StoreError::Corrupt { session_id: session_id.clone(), reason })?;

        let session_id_for_signals = session_id.clone();
        let checkpoint_sequence = checkpoint.sequence;
        let signal_rows = self
            .writer
            .submit(move |conn| -> rusqlite::Result<Vec<SignalRow>> {
                let mut statement = conn.prepare(
                    "SELECT id, session_id, story_id, kind, producer, timestamp_millis, payload, sequence
                     FROM signals WHERE session_id = ?1 AND sequence > ?2 ORDER BY sequence ASC",
                )?;
                let rows = statement
                    .query_map(params![session_id_for_signals.as_str(), checkpoint_sequence.get() as i64], SignalRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(store_unavailable)?
            .map_err(store_unavailable)?;

        let signals = signal_rows
            .into_iter()
            .map(SignalRow::into_signal)
            .collect::<Result<Vec<_>, String>>()
            .map_err(|reason| StoreError::Corrupt { session_id, reason })?;

        Ok(Some((checkpoint, signals)))
    }

    async fn append_audit(&self, signal: &Signal) -> Result<(), StoreError> {
        let signal = signal.clone();
        let result = self
            .writer
            .submit(move |conn| -> rusqlite::Result<()> {
                let payload = serde_json::to_string(&signal.payload).unwrap_or_default();
                conn.execute(
                    "INSERT OR IGNORE INTO signals (id, session_id, story_id, kind, producer, timestamp_millis, payload, sequence)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        signal.id.as_str(),
                        signal.session_id.as_str(),
                        signal.story_id.as_ref().map(StoryId::as_str),
                        signal_kind_wire(&signal.kind),
                        signal.producer,
                        signal.timestamp.as_unix_millis(),
                        payload,
                        signal.sequence.get() as i64,
                    ],
                )
                .map(|_| ())
            })
            .await
            .map_err(store_unavailable)?;
        result.map_err(store_unavailable)
    }

    async fn list_resumable_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        let rows = self
            .writer
            .submit(|conn| -> rusqlite::Result<Vec<String>> {
                let mut statement = conn.prepare("SELECT session_id FROM sessions WHERE status IN ('running', 'paused')")?;
                let rows = statement.query_map([], |row| row.get::<_, String>(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(store_unavailable)?
            .map_err(store_unavailable)?;
        Ok(rows.into_iter().map(SessionId::new).collect())
    }
}

/// The durable, at-least-once signal bus (C1), backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteBus {
    writer: Arc<WriterHandle>,
}

#[async_trait]
impl Bus for SqliteBus {
    async fn publish(&self, signal: Signal) -> Result<(), BusError> {
        let result = self
            .writer
            .submit(move |conn| -> rusqlite::Result<()> {
                let payload = serde_json::to_string(&signal.payload).unwrap_or_default();
                conn.execute(
                    "INSERT OR IGNORE INTO signals (id, session_id, story_id, kind, producer, timestamp_millis, payload, sequence)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        signal.id.as_str(),
                        signal.session_id.as_str(),
                        signal.story_id.as_ref().map(StoryId::as_str),
                        signal_kind_wire(&signal.kind),
                        signal.producer,
                        signal.timestamp.as_unix_millis(),
                        payload,
                        signal.sequence.get() as i64,
                    ],
                )
                .map(|_| ())
            })
            .await
            .map_err(bus_unavailable)?;
        result.map_err(bus_unavailable)
    }

    async fn subscribe(&self, session_id: &SessionId, from_sequence: Sequence) -> Result<Vec<Signal>, BusError> {
        let session_id = session_id.clone();
        let rows = self
            .writer
            .submit(move |conn| -> rusqlite::Result<Vec<SignalRow>> {
                let mut statement = conn.prepare(
                    "SELECT id, session_id, story_id, kind, producer, timestamp_millis, payload, sequence
                     FROM signals WHERE session_id = ?1 AND sequence > ?2 ORDER BY sequence ASC",
                )?;
                let rows = statement
                    .query_map(params![session_id.as_str(), from_sequence.get() as i64], SignalRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(bus_unavailable)?
            .map_err(bus_unavailable)?;

        rows.into_iter().map(SignalRow::into_signal).collect::<Result<Vec<_>, String>>().map_err(BusError::Unavailable)
    }

    async fn acknowledge(&self, session_id: &SessionId, sequence: Sequence) -> Result<(), BusError> {
        let session_id = session_id.clone();
        let result = self
            .writer
            .submit(move |conn| -> rusqlite::Result<()> {
                conn.execute(
                    "INSERT INTO bus_ack (session_id, acked_sequence) VALUES (?1, ?2)
                     ON CONFLICT(session_id) DO UPDATE SET acked_sequence = excluded.acked_sequence",
                    params![session_id.as_str(), sequence.get() as i64],
                )
                .map(|_| ())
            })
            .await
            .map_err(bus_unavailable)?;
        result.map_err(bus_unavailable)
    }
}

fn signal_kind_wire(kind: &SignalKind) -> String {
    serde_json::to_value(kind).ok().and_then(|value| value.as_str().map(str::to_string)).unwrap_or_else(|| "unknown".to_string())
}

struct CheckpointRow {
    session_id: String,
    sequence: i64,
    gate: String,
    per_story_gate: String,
    budget: String,
    outstanding_dispatches: String,
    context_summary: String,
    extra: String,
    created_at_millis: i64,
    content_hash: String,
}

impl CheckpointRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            sequence: row.get(1)?,
            gate: row.get(2)?,
            per_story_gate: row.get(3)?,
            budget: row.get(4)?,
            outstanding_dispatches: row.get(5)?,
            context_summary: row.get(6)?,
            extra: row.get(7)?,
            created_at_millis: row.get(8)?,
            content_hash: row.get(9)?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint, String> {
        let gate = gate_from_wire(&self.gate).ok_or_else(|| format!("unknown gate name {:?}", self.gate))?;
        let per_story_gate: std::collections::BTreeMap<String, Gate> =
            serde_json::from_str(&self.per_story_gate).map_err(|err| format!("bad per_story_gate json: {err}"))?;
        let budget = serde_json::from_str(&self.budget).map_err(|err| format!("bad budget json: {err}"))?;
        let outstanding_dispatches: Vec<OutstandingDispatch> =
            serde_json::from_str(&self.outstanding_dispatches).map_err(|err| format!("bad outstanding_dispatches json: {err}"))?;
        let context_summary: ContextSummary = serde_json::from_str(&self.context_summary).map_err(|err| format!("bad context_summary json: {err}"))?;
        let extra = serde_json::from_str(&self.extra).map_err(|err| format!("bad extra json: {err}"))?;

        let checkpoint = Checkpoint {
            session_id: SessionId::new(self.session_id),
            sequence: Sequence::new(self.sequence as u64),
            gate,
            per_story_gate,
            budget,
            outstanding_dispatches,
            context_summary,
            extra,
            created_at: wave_core::Timestamp::from_unix_millis(self.created_at_millis),
        };

        if checkpoint.content_hash() != self.content_hash {
            return Err(format!("content hash mismatch for session {}: stored {} computed {}", checkpoint.session_id, self.content_hash, checkpoint.content_hash()));
        }
        Ok(checkpoint)
    }
}

fn gate_from_wire(name: &str) -> Option<Gate> {
    Gate::CANONICAL_ORDER.into_iter().find(|gate| gate.name() == name)
}

struct SignalRow {
    id: String,
    session_id: String,
    story_id: Option<String>,
    kind: String,
    producer: String,
    timestamp_millis: i64,
    payload: String,
    sequence: i64,
}

impl SignalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            story_id: row.get(2)?,
            kind: row.get(3)?,
            producer: row.get(4)?,
            timestamp_millis: row.get(5)?,
            payload: row.get(6)?,
            sequence: row.get(7)?,
        })
    }

    fn into_signal(self) -> Result<Signal, String> {
        let kind: SignalKind = serde_json::from_value(serde_json::Value::String(self.kind.clone())).map_err(|err| format!("bad signal kind {:?}: {err}", self.kind))?;
        let payload = serde_json::from_str(&self.payload).map_err(|err| format!("bad signal payload json: {err}"))?;
        Ok(Signal::new(
            SignalId::new(self.id),
            SessionId::new(self.session_id),
            self.story_id.map(StoryId::new),
            kind,
            self.producer,
            wave_core::Timestamp::from_unix_millis(self.timestamp_millis),
            payload,
            Sequence::new(self.sequence as u64),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_core::BudgetLedger;
    use wave_core::Timestamp;

    fn checkpoint(session_id: &str, sequence: u64, status: Option<&str>) -> Checkpoint {
        let extra = match status {
            Some(status) => serde_json::json!({ SESSION_STATUS_EXTRA_KEY: status }),
            None => serde_json::Value::Null,
        };
        Checkpoint {
            session_id: SessionId::new(session_id),
            sequence: Sequence::new(sequence),
            gate: Gate::DesignValidated,
            per_story_gate: std::collections::BTreeMap::new(),
            budget: BudgetLedger::new(1_000),
            outstanding_dispatches: vec![],
            context_summary: ContextSummary::default(),
            extra,
            created_at: Timestamp::from_unix_millis(0),
        }
    }

    fn signal(session_id: &str, sequence: u64) -> Signal {
        Signal::new(
            SignalId::new(format!("sig-{sequence}")),
            SessionId::new(session_id),
            None,
            SignalKind::Heartbeat,
            "test",
            Timestamp::from_unix_millis(0),
            serde_json::Value::Null,
            Sequence::new(sequence),
        )
    }

    #[tokio::test]
    async fn save_then_load_latest_round_trips() {
        let (store, _bus) = open_in_memory().unwrap();
        store.save_checkpoint(checkpoint("s1", 1, Some("running")), &signal("s1", 1)).await.unwrap();
        let (loaded, since) = store.load_latest(&SessionId::new("s1")).await.unwrap().unwrap();
        assert_eq!(loaded.sequence, Sequence::new(1));
        assert!(since.is_empty());
    }

    #[tokio::test]
    async fn retains_only_last_five_checkpoints() {
        let (store, _bus) = open_in_memory().unwrap();
        for sequence in 1..=8u64 {
            store.save_checkpoint(checkpoint("s1", sequence, None), &signal("s1", sequence)).await.unwrap();
        }
        let (loaded, _) = store.load_latest(&SessionId::new("s1")).await.unwrap().unwrap();
        assert_eq!(loaded.sequence, Sequence::new(8));

        let count: i64 = store
            .writer
            .submit(|conn| conn.query_row("SELECT COUNT(*) FROM checkpoints WHERE session_id = 's1'", [], |row| row.get(0)).unwrap())
            .await
            .unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn list_resumable_sessions_reflects_session_status_extra() {
        let (store, _bus) = open_in_memory().unwrap();
        store.save_checkpoint(checkpoint("s1", 1, Some("running")), &signal("s1", 1)).await.unwrap();
        store.save_checkpoint(checkpoint("s2", 1, Some("completed")), &signal("s2", 1)).await.unwrap();
        let resumable = store.list_resumable_sessions().await.unwrap();
        assert_eq!(resumable, vec![SessionId::new("s1")]);
    }

    #[tokio::test]
    async fn save_checkpoint_records_triggering_signal_atomically() {
        let (store, _bus) = open_in_memory().unwrap();
        store.save_checkpoint(checkpoint("s1", 1, None), &signal("s1", 1)).await.unwrap();
        store.save_checkpoint(checkpoint("s1", 2, None), &signal("s1", 2)).await.unwrap();
        let (loaded, since) = store.load_latest(&SessionId::new("s1")).await.unwrap().unwrap();
        assert_eq!(loaded.sequence, Sequence::new(2));
        // The signal that triggered sequence 2's checkpoint was written inside
        // the same transaction as the snapshot, so it is durable even though
        // nothing ever called `append_audit` or `Bus::publish` for it.
        assert!(since.is_empty());
        let count: i64 = store
            .writer
            .submit(|conn| conn.query_row("SELECT COUNT(*) FROM signals WHERE session_id = 's1'", [], |row| row.get(0)).unwrap())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn publish_then_subscribe_round_trips_through_sqlite() {
        let (_store, bus) = open_in_memory().unwrap();
        for sequence in 1..=3 {
            bus.publish(signal("s1", sequence)).await.unwrap();
        }
        let signals = bus.subscribe(&SessionId::new("s1"), Sequence::NONE).await.unwrap();
        assert_eq!(signals.len(), 3);
    }

    #[tokio::test]
    async fn acknowledge_is_idempotent_and_does_not_affect_subscribe() {
        let (_store, bus) = open_in_memory().unwrap();
        bus.publish(signal("s1", 1)).await.unwrap();
        bus.acknowledge(&SessionId::new("s1"), Sequence::new(1)).await.unwrap();
        bus.acknowledge(&SessionId::new("s1"), Sequence::new(1)).await.unwrap();
        let signals = bus.subscribe(&SessionId::new("s1"), Sequence::NONE).await.unwrap();
        assert_eq!(signals.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_content_hash_is_reported_as_corrupt() {
        let (store, _bus) = open_in_memory().unwrap();
        store.save_checkpoint(checkpoint("s1", 1, None), &signal("s1", 1)).await.unwrap();
        store
            .writer
            .submit(|conn| conn.execute("UPDATE checkpoints SET content_hash = 'tampered' WHERE session_id = 's1'", []).unwrap())
            .await
            .unwrap();
        let err = store.load_latest(&SessionId::new("s1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
