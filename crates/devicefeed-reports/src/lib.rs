//! Per-device report rendering.
//!
//! The scheduler hands a renderer every record group for one device;
//! the renderer writes an artifact to disk and returns its path. The
//! artifact exists before the corresponding `reports` row is inserted.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use devicefeed_parser::DeviceRecord;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ReportRenderer: Send + Sync {
    /// Value stored in the Report row's `report_type` column.
    fn report_type(&self) -> &'static str;

    /// Render one device's records and return the artifact path.
    fn render(&self, unit_guid: Uuid, records: &[DeviceRecord]) -> Result<PathBuf, RenderError>;
}

fn artifact_path(output_dir: &Path, unit_guid: Uuid, extension: &str) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    output_dir.join(format!("{unit_guid}_{timestamp}.{extension}"))
}

fn report_lines(unit_guid: Uuid, records: &[DeviceRecord]) -> Vec<String> {
    let mut lines = vec![
        "Device Report".to_string(),
        format!("Unit GUID: {unit_guid}"),
        format!("Generated: {}", Utc::now().to_rfc3339()),
        format!("Total records: {}", records.len()),
        String::new(),
    ];

    for (index, record) in records.iter().enumerate() {
        lines.push(format!("Record {}:", index + 1));
        push_field(&mut lines, "Inventory ID", record.invid.as_deref());
        push_field(&mut lines, "Message ID", record.msg_id.as_deref());
        push_field(&mut lines, "Text", record.text.as_deref());
        push_field(
            &mut lines,
            "Class",
            record.class.map(|class| class.as_str()),
        );
        if let Some(level) = record.level {
            lines.push(format!("  Level: {level}"));
        }
        push_field(&mut lines, "Area", record.area.as_deref());
        push_field(&mut lines, "Address", record.addr.as_deref());
        push_field(&mut lines, "Block", record.block.as_deref());
        push_field(&mut lines, "Type", record.kind.as_deref());
        if let Some(bit) = record.bit {
            lines.push(format!("  Bit: {bit}"));
        }
        if let Some(invert) = record.invert_bit {
            lines.push(format!("  Invert Bit: {invert}"));
        }
        lines.push(String::new());
    }

    lines
}

fn push_field(lines: &mut Vec<String>, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        lines.push(format!("  {label}: {value}"));
    }
}

/// Writes the report body as plain UTF-8 text.
pub struct TextRenderer {
    output_dir: PathBuf,
}

impl TextRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl ReportRenderer for TextRenderer {
    fn report_type(&self) -> &'static str {
        "txt"
    }

    fn render(&self, unit_guid: Uuid, records: &[DeviceRecord]) -> Result<PathBuf, RenderError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = artifact_path(&self.output_dir, unit_guid, "txt");
        let body = report_lines(unit_guid, records).join("\n");
        fs::write(&path, body)?;
        Ok(path)
    }
}

/// Writes the report body as a minimal single-page PDF.
///
/// The document is assembled directly (catalog, page tree, one
/// Helvetica content stream, xref). Characters outside Latin-1 are
/// substituted, matching the core-font limitation of the usual PDF
/// toolkits.
pub struct PdfRenderer {
    output_dir: PathBuf,
}

impl PdfRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl ReportRenderer for PdfRenderer {
    fn report_type(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, unit_guid: Uuid, records: &[DeviceRecord]) -> Result<PathBuf, RenderError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = artifact_path(&self.output_dir, unit_guid, "pdf");
        let document = build_pdf(&report_lines(unit_guid, records));
        fs::write(&path, document)?;
        Ok(path)
    }
}

fn build_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT /F1 10 Tf 50 792 Td 14 TL\n");
    for line in lines {
        let _ = writeln!(content, "({}) Tj T*", escape_pdf_text(line));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    let mut document: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, object) in objects.iter().enumerate() {
        offsets.push(document.len());
        document.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, object).as_bytes());
    }

    let xref_offset = document.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(xref, "{offset:010} 00000 n ");
    }
    document.extend_from_slice(xref.as_bytes());
    document.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );

    document
}

fn escape_pdf_text(line: &str) -> String {
    line.chars()
        .map(|ch| match ch {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            ch if (ch as u32) < 256 => ch.to_string(),
            _ => "?".to_string(),
        })
        .collect()
}
