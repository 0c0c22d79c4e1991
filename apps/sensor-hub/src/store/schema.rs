use rusqlite::Connection;
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reading_metrics (
    reading_id INTEGER NOT NULL REFERENCES readings(id),
    name TEXT NOT NULL,
    value REAL NOT NULL,
    PRIMARY KEY (reading_id, name)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS readings_timestamp_idx
    ON readings (timestamp DESC, id DESC);

CREATE INDEX IF NOT EXISTS readings_device_timestamp_idx
    ON readings (device_id, timestamp DESC, id DESC);
"#;

pub(super) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn prepare_writer(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode = %mode, "sqlite did not switch to WAL; readers may block the writer");
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("schema.db")).unwrap();
        prepare_writer(&conn).unwrap();
        prepare_writer(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('readings', 'reading_metrics')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }
}
