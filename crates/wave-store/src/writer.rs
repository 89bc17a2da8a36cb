// crates/wave-store/src/writer.rs
// ============================================================================
// Module: Writer Gateway
// Description: A dedicated thread owning the single `rusqlite::Connection`
//              used by both `SqliteStore` and `SqliteBus`.
// Purpose: SQLite permits only one writer at a time; rather than contend a
//          mutex around blocking calls on the async runtime's worker
//          threads, every write and read goes through a bounded channel to
//          one thread that owns the connection outright (§4.1, §4.2: "single
//          writer thread, WAL mode, bounded queue").
// Dependencies: rusqlite, std::thread, std::sync::mpsc, tokio::sync::oneshot
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::mpsc;

use rusqlite::Connection;
use tracing::error;

/// A unit of work submitted to the writer thread: a closure given exclusive
/// access to the connection, and a channel to deliver its result back.
type Job = Box<dyn FnOnce(&mut Connection) + Send>;

/// A handle to the dedicated SQLite writer thread.
///
/// Cloning is cheap (an `mpsc::Sender` clone); every clone shares the same
/// underlying thread and connection.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    jobs: mpsc::SyncSender<Job>,
}

/// Error returned when the writer thread cannot accept or complete a job.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriterError {
    /// The writer thread has exited; the store is no longer usable.
    #[error("writer thread is no longer running")]
    ThreadGone,
    /// Opening or configuring the connection failed at startup.
    #[error("failed to open database at {path}: {reason}")]
    OpenFailed {
        /// The path that failed to open.
        path: String,
        /// The underlying error message.
        reason: String,
    },
}

impl WriterHandle {
    /// Spawns the writer thread against a database file, configuring WAL
    /// journaling and a busy-timeout so concurrent readers never block on
    /// the single writer for long.
    ///
    /// # Errors
    /// Returns [`WriterError::OpenFailed`] if the connection cannot be
    /// opened or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WriterError> {
        Self::open_with_init(path, |_conn| Ok(()))
    }

    /// Spawns the writer thread against a fresh in-memory database, for
    /// tests that want SQLite semantics without a file.
    ///
    /// # Errors
    /// Returns [`WriterError::OpenFailed`] if the in-memory connection
    /// cannot be configured.
    pub fn open_in_memory() -> Result<Self, WriterError> {
        Self::open_with_init(":memory:", |_conn| Ok(()))
    }

    /// Spawns the writer thread, running `init` (e.g. schema migrations)
    /// against the connection on the writer thread itself before the thread
    /// signals readiness. This keeps migration a one-time, ordered step that
    /// never races a caller's first `submit`.
    ///
    /// # Errors
    /// Returns [`WriterError::OpenFailed`] if the connection cannot be
    /// opened, configured, or if `init` fails.
    pub fn open_with_init(
        path: impl AsRef<Path>,
        init: impl FnOnce(&Connection) -> rusqlite::Result<()> + Send + 'static,
    ) -> Result<Self, WriterError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (jobs_tx, jobs_rx) = mpsc::sync_channel::<Job>(256);

        let thread_path = path.clone();
        std::thread::Builder::new()
            .name("wave-store-writer".to_string())
            .spawn(move || run_writer_thread(&thread_path, &ready_tx, &jobs_rx, init))
            .map_err(|err| WriterError::OpenFailed { path: path.display().to_string(), reason: err.to_string() })?;

        ready_rx
            .recv()
            .map_err(|_| WriterError::OpenFailed { path: path.display().to_string(), reason: "writer thread exited before signaling readiness".to_string() })?
            .map_err(|reason| WriterError::OpenFailed { path: path.display().to_string(), reason })?;

        Ok(Self { jobs: jobs_tx })
    }

    /// Submits a job to run on the writer thread and blocks (via a oneshot
    /// channel bridged through `tokio::task::spawn_blocking`-free async
    /// await) until it has run.
    ///
    /// # Errors
    /// Returns [`WriterError::ThreadGone`] if the writer thread has exited.
    pub async fn submit<F, T>(&self, job: F) -> Result<T, WriterError>
    where
        F: FnOnce(&mut Connection) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel::<T>();
        let boxed: Job = Box::new(move |conn| {
            let result = job(conn);
            let _ = reply_tx.send(result);
        });
        self.jobs.send(boxed).map_err(|_| WriterError::ThreadGone)?;
        reply_rx.await.map_err(|_| WriterError::ThreadGone)
    }
}

fn run_writer_thread(
    path: &Path,
    ready_tx: &mpsc::Sender<Result<(), String>>,
    jobs_rx: &mpsc::Receiver<Job>,
    init: impl FnOnce(&Connection) -> rusqlite::Result<()>,
) {
    let mut conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(path = %path.display(), %err, "writer thread failed to open database");
            let _ = ready_tx.send(Err(err.to_string()));
            return;
        }
    };

    if let Err(err) = configure_connection(&conn) {
        error!(path = %path.display(), %err, "writer thread failed to configure connection");
        let _ = ready_tx.send(Err(err.to_string()));
        return;
    }

    if let Err(err) = init(&conn) {
        error!(path = %path.display(), %err, "writer thread init (migration) failed");
        let _ = ready_tx.send(Err(err.to_string()));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    while let Ok(job) = jobs_rx.recv() {
        job(&mut conn);
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5_000)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_runs_job_on_writer_thread_and_returns_result() {
        let handle = WriterHandle::open_in_memory().unwrap();
        let value = handle.submit(|conn| conn.execute("CREATE TABLE t (id INTEGER)", []).map(|_| 42)).await.unwrap();
        assert_eq!(value.unwrap(), 42);
    }

    #[tokio::test]
    async fn jobs_run_sequentially_against_a_single_connection() {
        let handle = WriterHandle::open_in_memory().unwrap();
        handle.submit(|conn| conn.execute("CREATE TABLE t (n INTEGER)", []).unwrap()).await.unwrap();
        for n in 0..10 {
            let handle = handle.clone();
            handle.submit(move |conn| conn.execute("INSERT INTO t (n) VALUES (?1)", [n]).unwrap()).await.unwrap();
        }
        let count: i64 = handle.submit(|conn| conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)).unwrap()).await.unwrap();
        assert_eq!(count, 10);
    }
}
