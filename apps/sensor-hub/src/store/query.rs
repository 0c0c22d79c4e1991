use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use super::StoreError;
use crate::reading::{created_at_format, Metrics, Reading};

pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Restricts which readings a query returns. Every field is optional and
/// the set ones are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingFilter {
    pub device_id: Option<String>,
    /// Inclusive lower bound on the device timestamp (ms).
    pub since_ms: Option<i64>,
    /// Only readings admitted after this id.
    pub after_id: Option<i64>,
}

impl ReadingFilter {
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryOrder {
    /// Most recent device timestamp first.
    #[default]
    Descending,
    Ascending,
}

/// Result-size policy: a default when the caller asks for nothing sensible,
/// and a hard ceiling nobody can exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
            max_limit: MAX_QUERY_LIMIT,
        }
    }
}

impl QueryLimits {
    pub fn resolve(&self, requested: Option<i64>) -> u32 {
        match requested {
            Some(value) if value > 0 => value.min(i64::from(self.max_limit)) as u32,
            _ => self.default_limit,
        }
    }
}

struct RawRow {
    id: i64,
    device_id: String,
    timestamp: i64,
    created_at: String,
}

pub(super) fn select_readings(
    conn: &mut Connection,
    filter: &ReadingFilter,
    order: QueryOrder,
    limit: u32,
) -> Result<Vec<Reading>, StoreError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    if let Some(device_id) = &filter.device_id {
        args.push(Value::Text(device_id.clone()));
        clauses.push(format!("device_id = ?{}", args.len()));
    }
    if let Some(since_ms) = filter.since_ms {
        args.push(Value::Integer(since_ms));
        clauses.push(format!("timestamp >= ?{}", args.len()));
    }
    if let Some(after_id) = filter.after_id {
        args.push(Value::Integer(after_id));
        clauses.push(format!("id > ?{}", args.len()));
    }
    args.push(Value::Integer(i64::from(limit)));
    let limit_param = args.len();

    let mut sql = String::from("SELECT id, device_id, timestamp, created_at FROM readings");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(match order {
        QueryOrder::Descending => " ORDER BY timestamp DESC, id DESC",
        QueryOrder::Ascending => " ORDER BY timestamp ASC, id ASC",
    });
    sql.push_str(&format!(" LIMIT ?{limit_param}"));

    // One snapshot for the row scan and the metric lookups.
    let tx = conn.transaction()?;
    let rows = {
        let mut stmt = tx.prepare(&sql)?;
        let mapped = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok(RawRow {
                id: row.get(0)?,
                device_id: row.get(1)?,
                timestamp: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        mapped.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut readings = Vec::with_capacity(rows.len());
    {
        let mut metrics_stmt =
            tx.prepare_cached("SELECT name, value FROM reading_metrics WHERE reading_id = ?1")?;
        for row in rows {
            let metrics = metrics_stmt
                .query_map([row.id], |m| Ok((m.get::<_, String>(0)?, m.get::<_, f64>(1)?)))?
                .collect::<rusqlite::Result<Metrics>>()?;
            let created_at =
                created_at_format::parse(&row.created_at).map_err(|err| StoreError::Corrupt {
                    id: row.id,
                    reason: format!("created_at {:?}: {err}", row.created_at),
                })?;
            readings.push(Reading {
                id: row.id,
                device_id: row.device_id,
                metrics,
                timestamp: row.timestamp,
                created_at,
            });
        }
    }
    tx.commit()?;
    Ok(readings)
}

pub(super) fn select_stats(conn: &Connection) -> rusqlite::Result<(i64, Option<i64>)> {
    conn.query_row("SELECT COUNT(*), MAX(id) FROM readings", [], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })
}
