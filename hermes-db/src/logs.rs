//! SQLite-backed implementation of [`hermes_core::logbus::LogWriter`], plus
//! the filtered/paginated reads backing `GET /admin/logs/requests` and
//! `GET /admin/logs/sync`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hermes_core::catalog::SyncLogEvent;
use hermes_core::logbus::{LogWriter, RequestLogEvent};
use hermes_types::{
    Page, RequestLogEntry, RequestLogFilter, SyncLogEntry, SyncLogFilter, SyncResult,
};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

#[derive(FromRow)]
struct RequestLogRow {
    id: i64,
    method: String,
    path: String,
    model: Option<String>,
    status: i64,
    duration_ms: i64,
    ip: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<RequestLogRow> for RequestLogEntry {
    fn from(row: RequestLogRow) -> Self {
        RequestLogEntry {
            id: row.id,
            method: row.method,
            path: row.path,
            model: row.model,
            status: row.status as u16,
            duration_ms: row.duration_ms,
            ip: row.ip,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct SyncLogRow {
    id: i64,
    provider_id: Uuid,
    provider_name: String,
    model: String,
    result: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<SyncLogRow> for SyncLogEntry {
    fn from(row: SyncLogRow) -> Self {
        SyncLogEntry {
            id: row.id,
            provider_id: row.provider_id,
            provider_name: row.provider_name,
            model: row.model,
            result: if row.result == "success" { SyncResult::Success } else { SyncResult::Failure },
            message: row.message,
            created_at: row.created_at,
        }
    }
}

fn sync_result_to_str(result: SyncResult) -> &'static str {
    match result {
        SyncResult::Success => "success",
        SyncResult::Failure => "failure",
    }
}

/// SQLite-backed log repository: the log batcher's write target plus the
/// admin API's filtered/paginated reads.
pub struct LogRepository {
    pool: SqlitePool,
}

impl LogRepository {
    /// Build a repository over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Filtered, paginated request-log listing for `GET /admin/logs/requests`.
    pub async fn list_request_logs(&self, filter: &RequestLogFilter) -> Page<RequestLogEntry> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM request_logs WHERE 1 = 1");
        push_request_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to count request logs");
                0
            });

        let mut rows_query = QueryBuilder::<Sqlite>::new("SELECT * FROM request_logs WHERE 1 = 1");
        push_request_filters(&mut rows_query, filter);
        rows_query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(filter.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.page.offset));

        let items = rows_query
            .build_query_as::<RequestLogRow>()
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to list request logs");
                Vec::new()
            })
            .into_iter()
            .map(RequestLogEntry::from)
            .collect();

        Page {
            items,
            total: total.max(0) as u64,
        }
    }

    /// Filtered, paginated sync-log listing for `GET /admin/logs/sync`.
    pub async fn list_sync_logs(&self, filter: &SyncLogFilter) -> Page<SyncLogEntry> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sync_logs WHERE 1 = 1");
        push_sync_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to count sync logs");
                0
            });

        let mut rows_query = QueryBuilder::<Sqlite>::new("SELECT * FROM sync_logs WHERE 1 = 1");
        push_sync_filters(&mut rows_query, filter);
        rows_query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(filter.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.page.offset));

        let items = rows_query
            .build_query_as::<SyncLogRow>()
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to list sync logs");
                Vec::new()
            })
            .into_iter()
            .map(SyncLogEntry::from)
            .collect();

        Page {
            items,
            total: total.max(0) as u64,
        }
    }
}

fn push_request_filters<'a>(query: &mut QueryBuilder<'a, Sqlite>, filter: &'a RequestLogFilter) {
    if let Some(model) = &filter.model {
        query.push(" AND model = ").push_bind(model);
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(i64::from(status));
    }
}

fn push_sync_filters<'a>(query: &mut QueryBuilder<'a, Sqlite>, filter: &'a SyncLogFilter) {
    if let Some(provider_id) = filter.provider_id {
        query.push(" AND provider_id = ").push_bind(provider_id);
    }
    if let Some(result) = filter.result {
        query.push(" AND result = ").push_bind(sync_result_to_str(result));
    }
}

#[async_trait]
impl LogWriter for LogRepository {
    async fn write_batch(&self, request_logs: Vec<RequestLogEvent>, sync_logs: Vec<SyncLogEvent>) {
        if request_logs.is_empty() && sync_logs.is_empty() {
            return;
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(error = %e, "failed to open log-flush transaction");
                return;
            }
        };

        for log in &request_logs {
            let result = sqlx::query(
                "INSERT INTO request_logs (method, path, model, status, duration_ms, ip, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&log.method)
            .bind(&log.path)
            .bind(&log.model)
            .bind(i64::from(log.status))
            .bind(log.duration_ms)
            .bind(&log.ip)
            .bind(log.created_at)
            .execute(&mut *tx)
            .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to insert request log row");
            }
        }

        for log in &sync_logs {
            let result = sqlx::query(
                "INSERT INTO sync_logs (provider_id, provider_name, model, result, message, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(log.provider_id)
            .bind(&log.provider_name)
            .bind(&log.model)
            .bind(sync_result_to_str(log.result))
            .bind(&log.message)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to insert sync log row");
            }
        }

        if let Err(e) = tx.commit().await {
            tracing::error!(error = %e, "failed to commit log-flush transaction");
        }
    }
}
