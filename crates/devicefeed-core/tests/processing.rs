use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use devicefeed_core::config::{ProcessorConfig, ReportConfig, ReportType};
use devicefeed_core::watcher::hash_file;
use devicefeed_core::{DiscoveryEntry, FileProcessor};
use devicefeed_reports::TextRenderer;
use devicefeed_store::{FileStatus, Store, StoreSettings};
use tokio::runtime::Runtime;
use uuid::Uuid;

const UNIT_A: &str = "01749246-95f6-57db-b7c3-2ae0e8be671f";
const UNIT_B: &str = "af0d92bb-5e0c-4b52-9fd2-0c3bc52b3a9e";

fn store_settings(dsn: String) -> StoreSettings {
    StoreSettings {
        dsn,
        max_open_conns: 5,
        max_idle_conns: 1,
        conn_max_idle: Duration::from_secs(60),
        conn_max_lifetime: Duration::from_secs(600),
    }
}

async fn entry_for(path: &Path) -> DiscoveryEntry {
    let metadata = tokio::fs::metadata(path).await.expect("stat fixture");
    DiscoveryEntry {
        path: path.to_path_buf(),
        filename: path.file_name().unwrap().to_string_lossy().into_owned(),
        size: metadata.len(),
        modified: metadata.modified().ok(),
        hash: hash_file(path).await.expect("hash fixture"),
    }
}

struct Harness {
    store: Store,
    processor: Arc<FileProcessor>,
    watch_dir: std::path::PathBuf,
    archive_dir: std::path::PathBuf,
    error_dir: std::path::PathBuf,
    _tempdir: tempfile::TempDir,
}

async fn harness(dsn: String) -> Result<Harness> {
    let store = Store::connect(&store_settings(dsn)).await?;
    store.run_migrations().await?;
    sqlx::query("TRUNCATE TABLE files, device_data, processing_errors, reports, api_logs CASCADE")
        .execute(store.pool())
        .await?;

    let tempdir = tempfile::tempdir()?;
    let watch_dir = tempdir.path().join("incoming");
    let report = ReportConfig {
        kind: ReportType::Txt,
        output_path: tempdir.path().join("reports"),
        archive_path: tempdir.path().join("archive"),
        error_path: tempdir.path().join("error"),
    };
    std::fs::create_dir_all(&watch_dir)?;

    let processor_config = ProcessorConfig {
        readiness_timeout_secs: 3,
        readiness_poll_interval_ms: 50,
    };
    let renderer = Arc::new(TextRenderer::new(&report.output_path));
    let processor = Arc::new(FileProcessor::new(
        store.clone(),
        renderer,
        &report,
        processor_config,
    ));

    Ok(Harness {
        store,
        processor,
        watch_dir,
        archive_dir: report.archive_path.clone(),
        error_dir: report.error_path.clone(),
        _tempdir: tempdir,
    })
}

impl Harness {
    async fn drop_file(&self, name: &str, content: &str) -> DiscoveryEntry {
        let path = self.watch_dir.join(name);
        tokio::fs::write(&path, content).await.expect("write fixture");
        entry_for(&path).await
    }

    async fn file_record(&self, name: &str) -> devicefeed_store::FileRecord {
        self.store
            .latest_file_by_filename(name)
            .await
            .expect("query file")
            .expect("file record exists")
    }

    async fn records_for_filename(&self, name: &str) -> i64 {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files WHERE filename = $1")
            .bind(name)
            .fetch_one(self.store.pool())
            .await
            .expect("count files");
        row.0
    }
}

#[test]
fn ingest_scenarios() -> Result<()> {
    let dsn = match env::var("DEVICEFEED_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping processing integration test because DEVICEFEED_TEST_DATABASE_URL is not set"
            );
            return Ok(());
        }
    };

    let rt = Runtime::new()?;
    rt.block_on(async move {
        let harness = harness(dsn).await?;

        happy_path(&harness).await?;
        invalid_unit_guid(&harness).await?;
        mixed_validity(&harness).await?;
        duplicate_content(&harness).await?;
        empty_file(&harness).await?;
        unreadable_size_never_stabilizes(&harness).await?;

        harness.store.close().await;
        Ok(())
    })
}

async fn happy_path(harness: &Harness) -> Result<()> {
    let content = format!(
        "n\tmqtt\tinvid\tunit_guid\tmsg_id\ttext\tcontext\tclass\tlevel\tarea\taddr\n\
         1\t\tG-044322\t{UNIT_A}\tcold7_Defrost_status\tРазморозка\t\twaiting\t100\tLOCAL\tcold7_status.Defrost_status\n\
         2\t\tG-044322\t{UNIT_A}\tcold7_VentSK_status\tВентилятор\t\tworking\t100\tLOCAL\tcold7_status.VentSK_status\n"
    );
    let entry = harness.drop_file("device_test.tsv", &content).await;
    harness.processor.process(&entry).await?;

    let file = harness.file_record("device_test.tsv").await;
    assert_eq!(file.status, FileStatus::Completed);
    assert_eq!(file.rows_processed, 2);
    assert_eq!(file.rows_failed, 0);

    let unit = Uuid::parse_str(UNIT_A)?;
    let rows = harness.store.device_data_by_unit(unit, 50, 0).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].line_number, 2);
    assert_eq!(rows[1].line_number, 3);
    assert_eq!(rows[0].invid.as_deref(), Some("G-044322"));
    assert_eq!(rows[0].class.as_deref(), Some("waiting"));
    assert_eq!(rows[1].class.as_deref(), Some("working"));

    let reports = harness.store.reports_by_unit(unit).await?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].report_type, "txt");
    assert!(Path::new(&reports[0].file_path).is_file());

    assert!(!entry.path.exists(), "input should be moved out of watch dir");
    assert!(harness.archive_dir.join("device_test.tsv").is_file());
    Ok(())
}

async fn invalid_unit_guid(harness: &Harness) -> Result<()> {
    let entry = harness
        .drop_file("bad_guid.tsv", "n\tmqtt\tinvid\tunit_guid\n1\t\tG-1\tnot-a-uuid\n")
        .await;
    harness.processor.process(&entry).await?;

    let file = harness.file_record("bad_guid.tsv").await;
    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(file.rows_processed, 0);

    let errors = harness.store.errors_for_file(file.id).await?;
    assert!(!errors.is_empty());
    assert!(errors[0].error_message.contains("invalid unit_guid"));
    assert_eq!(errors[0].line_number, Some(2));

    assert!(harness.error_dir.join("bad_guid.tsv").is_file());
    Ok(())
}

async fn mixed_validity(harness: &Harness) -> Result<()> {
    let content = format!(
        "n\tmqtt\tinvid\tunit_guid\tmsg_id\ttext\tcontext\tclass\tlevel\n\
         1\t\tG-1\t{UNIT_B}\tmsg_a\t\t\twaiting\t100\n\
         2\t\tG-1\t{UNIT_B}\tmsg_b\t\t\twaiting\tabc\n\
         3\t\tG-1\t{UNIT_B}\tmsg_c\t\t\tINVALID_CLASS\t100\n"
    );
    let entry = harness.drop_file("mixed.tsv", &content).await;
    harness.processor.process(&entry).await?;

    let file = harness.file_record("mixed.tsv").await;
    assert_eq!(file.status, FileStatus::Partial);
    assert_eq!(file.rows_processed, 1);
    assert_eq!(file.rows_failed, 0);

    let errors = harness.store.errors_for_file(file.id).await?;
    assert_eq!(errors.len(), 2);

    assert!(harness.archive_dir.join("mixed.tsv").is_file());
    Ok(())
}

async fn duplicate_content(harness: &Harness) -> Result<()> {
    let content = format!("1\t\tG-1\t{UNIT_B}\n");
    let entry = harness.drop_file("dup.tsv", &content).await;
    harness.processor.process(&entry).await?;

    let unit = Uuid::parse_str(UNIT_B)?;
    let count_before = harness.store.count_device_data_by_unit(unit).await?;

    // the same content lands in the watch directory again
    let entry_again = harness.drop_file("dup.tsv", &content).await;
    harness.processor.process(&entry_again).await?;

    assert_eq!(harness.records_for_filename("dup.tsv").await, 1);
    let count_after = harness.store.count_device_data_by_unit(unit).await?;
    assert_eq!(count_before, count_after, "no new device rows on re-ingest");

    // the leftover on-disk copy was moved per the stored status
    assert!(!entry_again.path.exists());
    assert!(harness.archive_dir.join("dup.tsv").is_file());
    Ok(())
}

async fn empty_file(harness: &Harness) -> Result<()> {
    let entry = harness
        .drop_file("header_only.tsv", "n\tmqtt\tinvid\tunit_guid\n")
        .await;
    harness.processor.process(&entry).await?;

    let file = harness.file_record("header_only.tsv").await;
    assert_eq!(file.status, FileStatus::Failed);
    assert_eq!(file.rows_processed, 0);
    assert_eq!(file.rows_failed, 0);

    let errors = harness.store.errors_for_file(file.id).await?;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line_number, None);

    assert!(harness.error_dir.join("header_only.tsv").is_file());
    Ok(())
}

async fn unreadable_size_never_stabilizes(harness: &Harness) -> Result<()> {
    let entry = harness.drop_file("still_empty.tsv", "").await;
    let err = harness
        .processor
        .process(&entry)
        .await
        .expect_err("zero-size file never becomes ready");
    assert!(err.to_string().contains("not ready"));

    // nothing recorded, nothing moved: the next scan retries
    assert!(harness
        .store
        .latest_file_by_filename("still_empty.tsv")
        .await?
        .is_none());
    assert!(entry.path.exists());
    Ok(())
}
