use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one ingest attempt. `Completed`, `Partial`, and
/// `Failed` are terminal; counters are immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Partial,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Partial => "partial",
            FileStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStatus::Completed | FileStatus::Partial | FileStatus::Failed
        )
    }
}

/// One row of the `files` table: a single ingest attempt for one
/// (filename, content hash) pair.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub file_hash: String,
    pub status: FileStatus,
    pub rows_processed: i32,
    pub rows_failed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted `device_data` row, as read back for the API.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDataRecord {
    pub id: i64,
    pub file_id: i64,
    pub unit_guid: Uuid,
    pub mqtt: Option<String>,
    pub invid: Option<String>,
    pub msg_id: Option<String>,
    pub text: Option<String>,
    pub context: Option<String>,
    pub class: Option<String>,
    pub level: Option<i32>,
    pub area: Option<String>,
    pub addr: Option<String>,
    pub block: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub bit: Option<i32>,
    pub invert_bit: Option<bool>,
    pub line_number: i32,
}

/// A persisted `processing_errors` row. `line_number` is absent for
/// whole-file failures.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingErrorRecord {
    pub id: i64,
    pub file_id: i64,
    pub line_number: Option<i32>,
    pub raw_line: Option<String>,
    pub error_message: String,
    pub field_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input shape for recording a processing error inside the ingest
/// transaction.
#[derive(Debug, Clone)]
pub struct NewProcessingError {
    pub line_number: Option<i32>,
    pub raw_line: Option<String>,
    pub error_message: String,
    pub field_name: Option<String>,
}

impl NewProcessingError {
    pub fn whole_file(message: impl Into<String>) -> Self {
        Self {
            line_number: None,
            raw_line: None,
            error_message: message.into(),
            field_name: None,
        }
    }
}

/// A persisted `reports` row naming a rendered artifact on disk.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRecord {
    pub id: i64,
    pub unit_guid: Uuid,
    pub report_type: String,
    pub file_path: String,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate ingest counters surfaced by the read API.
#[derive(Debug, Clone, Serialize)]
pub struct IngestStatistics {
    pub files_total: i64,
    pub files_completed: i64,
    pub files_partial: i64,
    pub files_failed: i64,
    pub files_processing: i64,
    pub rows_processed_total: i64,
    pub rows_failed_total: i64,
    pub device_rows_total: i64,
    pub processing_errors_total: i64,
    pub reports_total: i64,
}
