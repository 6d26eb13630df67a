use devicefeed_parser::DeviceRecord;
use sqlx::{Acquire, Postgres, Transaction};

use crate::models::{FileRecord, FileStatus, NewProcessingError};
use crate::{file_from_row, StoreError};

/// Transactional surface of the store. Held by the file processor for
/// the duration of one ingest; dropping it without [`StoreTx::commit`]
/// rolls everything back.
pub struct StoreTx {
    tx: Transaction<'static, Postgres>,
}

impl StoreTx {
    pub(crate) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    /// Insert the FileRecord for this ingest with status `processing`.
    ///
    /// Hits the `(filename, file_hash)` unique index when another
    /// worker already ingested identical content; callers check
    /// [`StoreError::is_unique_violation`].
    pub async fn create_file(
        &mut self,
        filename: &str,
        file_hash: &str,
    ) -> Result<FileRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO files (filename, file_hash, status)
            VALUES ($1, $2, 'processing')
            RETURNING id, filename, file_hash, status, rows_processed, rows_failed,
                      error_message, created_at, updated_at
            "#,
        )
        .bind(filename)
        .bind(file_hash)
        .fetch_one(&mut *self.tx)
        .await?;

        file_from_row(&row)
    }

    pub async fn insert_processing_error(
        &mut self,
        file_id: i64,
        error: &NewProcessingError,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO processing_errors (file_id, line_number, raw_line, error_message, field_name)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(file_id)
        .bind(error.line_number)
        .bind(&error.raw_line)
        .bind(&error.error_message)
        .bind(&error.field_name)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Insert one validated row.
    ///
    /// Runs under a savepoint so a single failed row leaves the outer
    /// transaction usable; the processor counts the failure and moves
    /// on to the next row.
    pub async fn insert_device_row(
        &mut self,
        file_id: i64,
        record: &DeviceRecord,
    ) -> Result<(), StoreError> {
        let mut savepoint = self.tx.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO device_data (
                file_id, unit_guid, mqtt, invid, msg_id, text, context, class,
                level, area, addr, block, type, bit, invert_bit, line_number
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(file_id)
        .bind(record.unit_guid)
        .bind(&record.mqtt)
        .bind(&record.invid)
        .bind(&record.msg_id)
        .bind(&record.text)
        .bind(&record.context)
        .bind(record.class.map(|class| class.as_str()))
        .bind(record.level)
        .bind(&record.area)
        .bind(&record.addr)
        .bind(&record.block)
        .bind(&record.kind)
        .bind(record.bit)
        .bind(record.invert_bit)
        .bind(record.line_number)
        .execute(&mut *savepoint)
        .await;

        match result {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(())
            }
            Err(err) => {
                savepoint.rollback().await?;
                Err(err.into())
            }
        }
    }

    pub async fn update_progress(
        &mut self,
        file_id: i64,
        rows_processed: i32,
        rows_failed: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE files
            SET rows_processed = $2,
                rows_failed = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(file_id)
        .bind(rows_processed)
        .bind(rows_failed)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn update_status(
        &mut self,
        file_id: i64,
        status: FileStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE files
            SET status = $2,
                error_message = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(file_id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Make the whole ingest visible atomically: FileRecord, device
    /// rows, processing errors, counters, and terminal status.
    pub async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
