//! Typed gateway over the relational store: files, device_data,
//! processing_errors, reports, and api_logs.
//!
//! Everything here runs on the auto-commit surface except [`Store::begin`],
//! which hands out the transactional handle the file processor drives.

mod models;
mod tx;

use std::time::Duration;

use sqlx::migrate::MigrateError;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

pub use models::{
    DeviceDataRecord, FileRecord, FileStatus, IngestStatistics, NewProcessingError,
    ProcessingErrorRecord, ReportRecord,
};
pub use tx::StoreTx;

/// Tables that must exist before the service starts.
pub const REQUIRED_TABLES: [&str; 5] = [
    "files",
    "device_data",
    "processing_errors",
    "reports",
    "api_logs",
];

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub dsn: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_idle: Duration,
    pub conn_max_lifetime: Duration,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("invalid status value '{0}'")]
    InvalidStatus(String),

    #[error("health check failed: {0}")]
    HealthCheck(String),

    #[error("required table '{0}' is missing")]
    MissingTable(String),
}

impl StoreError {
    /// True when the underlying failure is a unique-constraint hit,
    /// which the processor treats as "already processed".
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    }
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_open_conns)
            .min_connections(settings.max_idle_conns)
            .idle_timeout(settings.conn_max_idle)
            .max_lifetime(settings.conn_max_lifetime)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&settings.dsn)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run the embedded migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        let value: i32 = row.try_get(0)?;
        if value != 1 {
            return Err(StoreError::HealthCheck(format!(
                "unexpected result: {value}"
            )));
        }
        Ok(())
    }

    /// Assert the five required tables exist. Missing tables are fatal
    /// at startup.
    pub async fn ensure_tables(&self) -> Result<(), StoreError> {
        for table in REQUIRED_TABLES {
            let row = sqlx::query(
                r#"
                SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = 'public'
                    AND table_name = $1
                )
                "#,
            )
            .bind(table)
            .fetch_one(&self.pool)
            .await?;

            let exists: bool = row.try_get(0)?;
            if !exists {
                return Err(StoreError::MissingTable(table.to_string()));
            }
        }
        Ok(())
    }

    /// Begin the ingest transaction. The processor is the only caller.
    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(StoreTx::new(tx))
    }

    /// Latest ingest attempt recorded for a filename, across hashes.
    pub async fn latest_file_by_filename(
        &self,
        filename: &str,
    ) -> Result<Option<FileRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, file_hash, status, rows_processed, rows_failed,
                   error_message, created_at, updated_at
            FROM files
            WHERE filename = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| file_from_row(&row)).transpose()
    }

    pub async fn list_files(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, file_hash, status, rows_processed, rows_failed,
                   error_message, created_at, updated_at
            FROM files
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(file_from_row).collect()
    }

    pub async fn list_files_by_status(
        &self,
        status: FileStatus,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, file_hash, status, rows_processed, rows_failed,
                   error_message, created_at, updated_at
            FROM files
            WHERE status = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(file_from_row).collect()
    }

    pub async fn errors_for_file(
        &self,
        file_id: i64,
    ) -> Result<Vec<ProcessingErrorRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_id, line_number, raw_line, error_message, field_name, created_at
            FROM processing_errors
            WHERE file_id = $1
            ORDER BY id
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ProcessingErrorRecord {
                    id: row.try_get("id")?,
                    file_id: row.try_get("file_id")?,
                    line_number: row.try_get("line_number")?,
                    raw_line: row.try_get("raw_line")?,
                    error_message: row.try_get("error_message")?,
                    field_name: row.try_get("field_name")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn device_data_by_unit(
        &self,
        unit_guid: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeviceDataRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, file_id, unit_guid, mqtt, invid, msg_id, text, context, class,
                   level, area, addr, block, type, bit, invert_bit, line_number
            FROM device_data
            WHERE unit_guid = $1
            ORDER BY file_id, line_number
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(unit_guid)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DeviceDataRecord {
                    id: row.try_get("id")?,
                    file_id: row.try_get("file_id")?,
                    unit_guid: row.try_get("unit_guid")?,
                    mqtt: row.try_get("mqtt")?,
                    invid: row.try_get("invid")?,
                    msg_id: row.try_get("msg_id")?,
                    text: row.try_get("text")?,
                    context: row.try_get("context")?,
                    class: row.try_get("class")?,
                    level: row.try_get("level")?,
                    area: row.try_get("area")?,
                    addr: row.try_get("addr")?,
                    block: row.try_get("block")?,
                    kind: row.try_get("type")?,
                    bit: row.try_get("bit")?,
                    invert_bit: row.try_get("invert_bit")?,
                    line_number: row.try_get("line_number")?,
                })
            })
            .collect()
    }

    pub async fn count_device_data_by_unit(&self, unit_guid: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) FROM device_data WHERE unit_guid = $1")
            .bind(unit_guid)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get(0)?)
    }

    pub async fn reports_by_unit(&self, unit_guid: Uuid) -> Result<Vec<ReportRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, unit_guid, report_type, file_path, generated_at
            FROM reports
            WHERE unit_guid = $1
            ORDER BY generated_at DESC, id DESC
            "#,
        )
        .bind(unit_guid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ReportRecord {
                    id: row.try_get("id")?,
                    unit_guid: row.try_get("unit_guid")?,
                    report_type: row.try_get("report_type")?,
                    file_path: row.try_get("file_path")?,
                    generated_at: row.try_get("generated_at")?,
                })
            })
            .collect()
    }

    /// Record a rendered report artifact. Runs outside the ingest
    /// transaction; the artifact exists on disk before this commits.
    pub async fn insert_report(
        &self,
        unit_guid: Uuid,
        report_type: &str,
        file_path: &str,
    ) -> Result<ReportRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO reports (unit_guid, report_type, file_path)
            VALUES ($1, $2, $3)
            RETURNING id, unit_guid, report_type, file_path, generated_at
            "#,
        )
        .bind(unit_guid)
        .bind(report_type)
        .bind(file_path)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReportRecord {
            id: row.try_get("id")?,
            unit_guid: row.try_get("unit_guid")?,
            report_type: row.try_get("report_type")?,
            file_path: row.try_get("file_path")?,
            generated_at: row.try_get("generated_at")?,
        })
    }

    pub async fn insert_api_log(
        &self,
        endpoint: &str,
        method: &str,
        status_code: i32,
        response_time_ms: i32,
        unit_guid: Option<Uuid>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO api_logs (endpoint, method, status_code, response_time_ms, unit_guid)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(endpoint)
        .bind(method)
        .bind(status_code)
        .bind(response_time_ms)
        .bind(unit_guid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregate counters across the whole store.
    pub async fn statistics(&self) -> Result<IngestStatistics, StoreError> {
        let files = sqlx::query(
            r#"
            SELECT COUNT(*)                                        AS files_total,
                   COUNT(*) FILTER (WHERE status = 'completed')    AS files_completed,
                   COUNT(*) FILTER (WHERE status = 'partial')      AS files_partial,
                   COUNT(*) FILTER (WHERE status = 'failed')       AS files_failed,
                   COUNT(*) FILTER (WHERE status = 'processing')   AS files_processing,
                   COALESCE(SUM(rows_processed), 0)::BIGINT        AS rows_processed_total,
                   COALESCE(SUM(rows_failed), 0)::BIGINT           AS rows_failed_total
            FROM files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let totals = sqlx::query(
            r#"
            SELECT (SELECT COUNT(*) FROM device_data)        AS device_rows_total,
                   (SELECT COUNT(*) FROM processing_errors)  AS processing_errors_total,
                   (SELECT COUNT(*) FROM reports)            AS reports_total
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(IngestStatistics {
            files_total: files.try_get("files_total")?,
            files_completed: files.try_get("files_completed")?,
            files_partial: files.try_get("files_partial")?,
            files_failed: files.try_get("files_failed")?,
            files_processing: files.try_get("files_processing")?,
            rows_processed_total: files.try_get("rows_processed_total")?,
            rows_failed_total: files.try_get("rows_failed_total")?,
            device_rows_total: totals.try_get("device_rows_total")?,
            processing_errors_total: totals.try_get("processing_errors_total")?,
            reports_total: totals.try_get("reports_total")?,
        })
    }

    pub async fn delete_api_logs_before(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM api_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Prune completed ingests older than the cutoff. Device rows and
    /// processing errors follow via ON DELETE CASCADE.
    pub async fn delete_completed_files_before(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM files WHERE status = 'completed' AND updated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_reports_before(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM reports WHERE generated_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

pub(crate) fn file_from_row(row: &PgRow) -> Result<FileRecord, StoreError> {
    let status_str: String = row.try_get("status")?;
    let status = FileStatus::from_str(&status_str)
        .ok_or_else(|| StoreError::InvalidStatus(status_str.clone()))?;

    Ok(FileRecord {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        file_hash: row.try_get("file_hash")?,
        status,
        rows_processed: row.try_get("rows_processed")?,
        rows_failed: row.try_get("rows_failed")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
