//! Append-only SQLite store for readings.
//!
//! A dedicated `store-writer` thread owns the write connection and applies
//! inserts one at a time; that single thread is where ids are allocated and
//! where commit order is decided. Each committed reading is published on an
//! ordered commit feed for live distribution. Queries never touch the writer:
//! they run on the blocking pool with their own read-only connections (WAL).

mod query;
mod schema;
mod writer;

pub use query::{QueryLimits, QueryOrder, ReadingFilter, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::reading::{NewReading, Reading};
use writer::WriterCommand;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store writer stopped")]
    WriterStopped,
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("corrupt reading {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub path: PathBuf,
    pub limits: QueryLimits,
}

impl StoreOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limits: QueryLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub readings: i64,
    pub last_id: Option<i64>,
}

/// Cloneable handle to the reading store.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<WriterCommand>,
    path: Arc<PathBuf>,
    limits: QueryLimits,
}

impl StoreHandle {
    /// Opens (creating if needed) the database and starts the writer thread.
    /// The returned receiver yields every committed reading in commit order.
    pub fn open(
        options: StoreOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Reading>), StoreError> {
        if let Some(parent) = options.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&options.path)?;
        schema::prepare_writer(&conn)?;
        let (_, last_id) = query::select_stats(&conn)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("store-writer".to_string())
            .spawn(move || writer::run_writer(conn, rx, commit_tx))?;

        tracing::info!(
            path = %options.path.display(),
            last_id = ?last_id,
            "reading store opened"
        );

        Ok((
            Self {
                tx,
                path: Arc::new(options.path),
                limits: options.limits,
            },
            commit_rx,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Assigns the next id and durably commits the reading. Either the whole
    /// reading (row and metrics) is committed or nothing is.
    pub async fn insert(&self, reading: NewReading) -> Result<Reading, StoreError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Insert {
                reading,
                respond_to,
            })
            .map_err(|_| StoreError::WriterStopped)?;
        rx.await.map_err(|_| StoreError::WriterStopped)?
    }

    /// Reads at most `limit` readings (resolved against the store's
    /// [`QueryLimits`]) matching `filter`.
    pub async fn query(
        &self,
        filter: ReadingFilter,
        limit: Option<i64>,
        order: QueryOrder,
    ) -> Result<Vec<Reading>, StoreError> {
        let limit = self.limits.resolve(limit);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open_reader(&path)?;
            query::select_readings(&mut conn, &filter, order, limit)
        })
        .await?
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_reader(&path)?;
            let (readings, last_id) = query::select_stats(&conn)?;
            Ok(StoreStats { readings, last_id })
        })
        .await?
    }
}

fn open_reader(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(schema::BUSY_TIMEOUT)?;
    Ok(conn)
}
