use rusqlite::{params, Connection};
use tokio::sync::{mpsc, oneshot};

use super::StoreError;
use crate::reading::{created_at_format, NewReading, Reading};

pub(super) enum WriterCommand {
    Insert {
        reading: NewReading,
        respond_to: oneshot::Sender<Result<Reading, StoreError>>,
    },
}

/// Owns the only write connection. Commands are applied strictly one at a
/// time, so id allocation and commit order are the same sequence, and every
/// committed reading goes out on `commits` before its caller is answered.
pub(super) fn run_writer(
    mut conn: Connection,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    commits: mpsc::UnboundedSender<Reading>,
) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            WriterCommand::Insert {
                reading,
                respond_to,
            } => {
                let result = insert_reading(&mut conn, reading).map_err(StoreError::from);
                match &result {
                    Ok(stored) => {
                        if commits.send(stored.clone()).is_err() {
                            tracing::debug!(
                                id = stored.id,
                                "commit feed closed; reading not distributed"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "reading insert failed");
                    }
                }
                let _ = respond_to.send(result);
            }
        }
    }
    tracing::info!("store writer stopped");
}

fn insert_reading(conn: &mut Connection, reading: NewReading) -> rusqlite::Result<Reading> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO readings (device_id, timestamp, created_at) VALUES (?1, ?2, ?3)",
        params![
            reading.device_id,
            reading.timestamp,
            created_at_format::format(&reading.received_at)
        ],
    )?;
    let id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO reading_metrics (reading_id, name, value) VALUES (?1, ?2, ?3)",
        )?;
        for (name, value) in &reading.metrics {
            stmt.execute(params![id, name, value])?;
        }
    }
    tx.commit()?;
    Ok(reading.into_reading(id))
}
