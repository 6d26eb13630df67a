//! Report scheduling: group a file's parsed rows by device and hand
//! each group to the configured renderer, outside the ingest
//! transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use devicefeed_parser::DeviceRecord;
use devicefeed_reports::{PdfRenderer, ReportRenderer, TextRenderer};
use devicefeed_store::Store;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{ReportConfig, ReportType};

/// Build the renderer selected by configuration.
pub fn build_renderer(config: &ReportConfig) -> Arc<dyn ReportRenderer> {
    match config.kind {
        ReportType::Txt => Arc::new(TextRenderer::new(&config.output_path)),
        ReportType::Pdf => Arc::new(PdfRenderer::new(&config.output_path)),
    }
}

/// Group records by device, in stable unit_guid order.
pub fn group_by_unit(records: &[DeviceRecord]) -> BTreeMap<Uuid, Vec<DeviceRecord>> {
    let mut groups: BTreeMap<Uuid, Vec<DeviceRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.unit_guid)
            .or_default()
            .push(record.clone());
    }
    groups
}

/// Render one report per distinct device and record each artifact.
/// A failure for one device never affects the others.
pub async fn schedule_reports(
    store: &Store,
    renderer: &dyn ReportRenderer,
    records: &[DeviceRecord],
) {
    for (unit_guid, group) in group_by_unit(records) {
        let path = match renderer.render(unit_guid, &group) {
            Ok(path) => path,
            Err(err) => {
                error!(unit = %unit_guid, error = %err, "report rendering failed");
                continue;
            }
        };

        let path_str = path.to_string_lossy();
        match store
            .insert_report(unit_guid, renderer.report_type(), &path_str)
            .await
        {
            Ok(_) => info!(unit = %unit_guid, path = %path_str, "report generated"),
            Err(err) => {
                error!(unit = %unit_guid, error = %err, "failed to record report")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::group_by_unit;
    use devicefeed_parser::DeviceRecord;
    use uuid::Uuid;

    #[test]
    fn grouping_splits_records_per_device_keeping_row_order() {
        let unit_a = Uuid::parse_str("01749246-95f6-57db-b7c3-2ae0e8be671f").unwrap();
        let unit_b = Uuid::parse_str("af0d92bb-5e0c-4b52-9fd2-0c3bc52b3a9e").unwrap();

        let records = vec![
            DeviceRecord::new(unit_a, 2),
            DeviceRecord::new(unit_b, 3),
            DeviceRecord::new(unit_a, 4),
        ];

        let groups = group_by_unit(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[&unit_a]
                .iter()
                .map(|record| record.line_number)
                .collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(groups[&unit_b].len(), 1);
    }

    #[test]
    fn grouping_empty_input_yields_no_groups() {
        assert!(group_by_unit(&[]).is_empty());
    }
}
