//! Windowed reads for chart seeding and table backfill.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::reading::Reading;
use crate::store::{QueryOrder, ReadingFilter, StoreError, StoreHandle};

pub const DEFAULT_TABLE_ROWS: u32 = 10;

/// Symbolic look-back window. Unrecognised labels mean the last 24 hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "6h")]
    Last6Hours,
    #[default]
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "7d")]
    Last7Days,
}

impl TimeRange {
    pub fn parse(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("1h") => Self::LastHour,
            Some("6h") => Self::Last6Hours,
            Some("24h") => Self::Last24Hours,
            Some("7d") => Self::Last7Days,
            _ => Self::Last24Hours,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastHour => "1h",
            Self::Last6Hours => "6h",
            Self::Last24Hours => "24h",
            Self::Last7Days => "7d",
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Self::LastHour => Duration::hours(1),
            Self::Last6Hours => Duration::hours(6),
            Self::Last24Hours => Duration::hours(24),
            Self::Last7Days => Duration::days(7),
        }
    }

    /// Inclusive lower bound for readings inside the window ending at `now`.
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

/// Who the rows are for: charts want oldest-first, tables newest-first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryView {
    #[default]
    Chart,
    Table,
}

impl HistoryView {
    pub fn parse(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("table") => Self::Table,
            _ => Self::Chart,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRequest {
    pub metric: Option<String>,
    pub range: TimeRange,
    pub device_id: Option<String>,
    pub view: HistoryView,
    /// Only readings newer than this id, for incremental catch-up.
    pub after_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub id: i64,
    pub timestamp: i64,
    #[serde(with = "crate::reading::created_at_format")]
    pub created_at: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryResult {
    pub range: TimeRange,
    pub since: DateTime<Utc>,
    pub view: HistoryView,
    pub metric: Option<String>,
    pub readings: Vec<Reading>,
    /// Chart series for `metric`, oldest first; readings without the metric
    /// are skipped.
    pub points: Option<Vec<ChartPoint>>,
}

impl HistoryResult {
    /// Nothing to show: no readings, or none carrying the requested metric.
    pub fn is_empty(&self) -> bool {
        match &self.points {
            Some(points) => points.is_empty(),
            None => self.readings.is_empty(),
        }
    }
}

pub struct HistoryService {
    store: StoreHandle,
    table_rows: u32,
}

impl HistoryService {
    pub fn new(store: StoreHandle, table_rows: u32) -> Self {
        Self {
            store,
            table_rows: table_rows.max(1),
        }
    }

    pub async fn fetch(&self, request: &HistoryRequest) -> Result<HistoryResult, StoreError> {
        self.fetch_at(request, Utc::now()).await
    }

    pub async fn fetch_at(
        &self,
        request: &HistoryRequest,
        now: DateTime<Utc>,
    ) -> Result<HistoryResult, StoreError> {
        let since = request.range.cutoff(now);
        let filter = ReadingFilter {
            device_id: request.device_id.clone(),
            since_ms: Some(since.timestamp_millis()),
            after_id: request.after_id,
        };

        let readings = match request.view {
            HistoryView::Chart => {
                // Most recent window of rows, then flipped for plotting.
                let max = i64::from(self.store.limits().max_limit);
                let mut rows = self
                    .store
                    .query(filter, Some(max), QueryOrder::Descending)
                    .await?;
                rows.reverse();
                rows
            }
            HistoryView::Table => {
                // The table always lists the latest rows, however old they are.
                let filter = ReadingFilter {
                    since_ms: None,
                    ..filter
                };
                self.store
                    .query(
                        filter,
                        Some(i64::from(self.table_rows)),
                        QueryOrder::Descending,
                    )
                    .await?
            }
        };

        let points = request.metric.as_deref().map(|metric| {
            readings
                .iter()
                .filter_map(|reading| {
                    reading.metric(metric).map(|value| ChartPoint {
                        id: reading.id,
                        timestamp: reading.timestamp,
                        created_at: reading.created_at,
                        value,
                    })
                })
                .collect()
        });

        Ok(HistoryResult {
            range: request.range,
            since,
            view: request.view,
            metric: request.metric.clone(),
            readings,
            points,
        })
    }
}
