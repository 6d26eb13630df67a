use thiserror::Error;

/// Validation failure for a single record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("insufficient fields: got {found}, need at least {min}")]
    InsufficientFields { found: usize, min: usize },

    #[error("invalid unit_guid '{value}'")]
    InvalidUnitGuid { value: String },

    #[error("invalid class value: {value}")]
    InvalidClass { value: String },

    #[error("invalid level (not integer): {value}")]
    InvalidLevel { value: String },

    #[error("invalid bit (not integer): {value}")]
    InvalidBit { value: String },

    #[error("invalid invert_bit: {value}")]
    InvalidInvertBit { value: String },
}

impl RecordError {
    /// Name of the offending column, where the failure is field-scoped.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            RecordError::InsufficientFields { .. } => None,
            RecordError::InvalidUnitGuid { .. } => Some("unit_guid"),
            RecordError::InvalidClass { .. } => Some("class"),
            RecordError::InvalidLevel { .. } => Some("level"),
            RecordError::InvalidBit { .. } => Some("bit"),
            RecordError::InvalidInvertBit { .. } => Some("invert_bit"),
        }
    }
}

/// A record that failed validation, anchored to its source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    /// 1-based physical line number within the source file.
    pub line_number: i32,
    pub raw_line: String,
    pub error: RecordError,
}

impl LineError {
    pub fn new(line_number: i32, raw_line: impl Into<String>, error: RecordError) -> Self {
        Self {
            line_number,
            raw_line: raw_line.into(),
            error,
        }
    }
}
