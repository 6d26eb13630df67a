//! Parsing and validation for TSV device-event files.

pub mod document;
pub mod errors;
pub mod model;
mod record;

pub use document::{normalize_separators, parse_document, ParsedDocument};
pub use errors::{LineError, RecordError};
pub use model::{DeviceClass, DeviceRecord};
pub use record::parse_record;

#[cfg(test)]
mod tests;
