//! Service configuration: TOML file, `DEVICEFEED_*` environment
//! overrides, defaults, validation, and path normalization.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use devicefeed_store::StoreSettings;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("config validation errors: {0}")]
    Invalid(String),
}

/// Locations probed when no explicit config path is given.
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["devicefeed.toml", "config/devicefeed.toml"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub watch: WatchConfig,
    pub worker: WorkerConfig,
    pub processor: ProcessorConfig,
    pub report: ReportConfig,
    pub store: StoreConfig,
    pub cleanup: CleanupConfig,
    pub log: LogConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub path: PathBuf,
    pub scan_interval_secs: u64,
    pub queue_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./incoming"),
            scan_interval_secs: 30,
            queue_size: 100,
        }
    }
}

impl WatchConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub count: usize,
    pub file_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 3,
            file_timeout_secs: 600,
            shutdown_grace_secs: 30,
        }
    }
}

impl WorkerConfig {
    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorConfig {
    pub readiness_timeout_secs: u64,
    pub readiness_poll_interval_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_secs: 10,
            readiness_poll_interval_ms: 500,
        }
    }
}

impl ProcessorConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Txt,
    Pdf,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Txt => "txt",
            ReportType::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(rename = "type")]
    pub kind: ReportType,
    pub output_path: PathBuf,
    pub archive_path: PathBuf,
    pub error_path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            kind: ReportType::Pdf,
            output_path: PathBuf::from("./reports"),
            archive_path: PathBuf::from("./archive"),
            error_path: PathBuf::from("./error"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub dsn: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_idle_secs: u64,
    pub conn_max_lifetime_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            max_open_conns: 25,
            max_idle_conns: 5,
            conn_max_idle_secs: 300,
            conn_max_lifetime_secs: 1800,
        }
    }
}

impl StoreConfig {
    pub fn settings(&self) -> StoreSettings {
        StoreSettings {
            dsn: self.dsn.clone(),
            max_open_conns: self.max_open_conns,
            max_idle_conns: self.max_idle_conns,
            conn_max_idle: Duration::from_secs(self.conn_max_idle_secs),
            conn_max_lifetime: Duration::from_secs(self.conn_max_lifetime_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupConfig {
    pub api_log_retention_days: i64,
    pub report_retention_days: i64,
    pub file_retention_days: i64,
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            api_log_retention_days: 30,
            report_retention_days: 365,
            file_retention_days: 30,
            interval_secs: 86_400,
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration: explicit file if given, otherwise the first
    /// default location that exists, otherwise pure defaults. The
    /// environment overrides whatever the file said.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match DEFAULT_CONFIG_PATHS
                .iter()
                .map(Path::new)
                .find(|candidate| candidate.is_file())
            {
                Some(found) => Self::from_file(found)?,
                None => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        config.normalize_paths();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("DEVICEFEED_STORE_DSN") {
            self.store.dsn = value;
        }
        if let Ok(value) = env::var("DATABASE_URL") {
            if self.store.dsn.is_empty() {
                self.store.dsn = value;
            }
        }
        if let Ok(value) = env::var("DEVICEFEED_WATCH_PATH") {
            self.watch.path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("DEVICEFEED_REPORT_OUTPUT_PATH") {
            self.report.output_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("DEVICEFEED_REPORT_ARCHIVE_PATH") {
            self.report.archive_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("DEVICEFEED_REPORT_ERROR_PATH") {
            self.report.error_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("DEVICEFEED_LOG_LEVEL") {
            self.log.level = value;
        }
        if let Ok(value) = env::var("DEVICEFEED_LOG_FORMAT") {
            self.log.format = value;
        }
        if let Ok(value) = env::var("DEVICEFEED_API_ADDR") {
            self.api.addr = value;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.store.dsn.is_empty() {
            errors.push("store.dsn is required".to_string());
        }
        if self.watch.path.as_os_str().is_empty() {
            errors.push("watch.path is required".to_string());
        }
        if self.watch.scan_interval_secs == 0 {
            errors.push("watch.scan_interval_secs must be greater than 0".to_string());
        }
        if self.watch.queue_size == 0 {
            errors.push("watch.queue_size must be greater than 0".to_string());
        }
        if self.worker.count == 0 {
            errors.push("worker.count must be greater than 0".to_string());
        }
        if self.report.output_path.as_os_str().is_empty() {
            errors.push("report.output_path is required".to_string());
        }
        if self.report.archive_path.as_os_str().is_empty() {
            errors.push("report.archive_path is required".to_string());
        }
        if self.report.error_path.as_os_str().is_empty() {
            errors.push("report.error_path is required".to_string());
        }
        if !matches!(self.log.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "log.format must be 'json' or 'pretty', got '{}'",
                self.log.format
            ));
        }
        if self.api.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("api.addr '{}' is not a valid address", self.api.addr));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join(", ")))
        }
    }

    fn normalize_paths(&mut self) {
        self.watch.path = absolutize(&self.watch.path);
        self.report.output_path = absolutize(&self.report.output_path);
        self.report.archive_path = absolutize(&self.report.archive_path);
        self.report.error_path = absolutize(&self.report.error_path);
    }

    /// Create the directories the pipeline writes to.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            &self.watch.path,
            &self.report.output_path,
            &self.report.archive_path,
            &self.report.error_path,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.dsn = "postgres://localhost/devicefeed".to_string();
        config
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = AppConfig::default();
        assert_eq!(config.watch.scan_interval(), Duration::from_secs(30));
        assert_eq!(config.watch.queue_size, 100);
        assert_eq!(config.worker.count, 3);
        assert_eq!(config.worker.file_timeout(), Duration::from_secs(600));
        assert_eq!(config.worker.shutdown_grace(), Duration::from_secs(30));
        assert_eq!(config.processor.readiness_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.processor.readiness_poll_interval(),
            Duration::from_millis(500)
        );
        assert_eq!(config.report.kind, ReportType::Pdf);
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn parses_a_full_config_file() {
        let toml = r#"
            [watch]
            path = "/data/incoming"
            scan_interval_secs = 5
            queue_size = 16

            [worker]
            count = 2

            [report]
            type = "txt"
            output_path = "/data/reports"

            [store]
            dsn = "postgres://db/devicefeed"
            max_open_conns = 10

            [log]
            level = "debug"
            format = "pretty"
        "#;

        let config: AppConfig = toml::from_str(toml).expect("config should parse");
        assert_eq!(config.watch.path, PathBuf::from("/data/incoming"));
        assert_eq!(config.watch.scan_interval_secs, 5);
        assert_eq!(config.watch.queue_size, 16);
        assert_eq!(config.worker.count, 2);
        assert_eq!(config.report.kind, ReportType::Txt);
        assert_eq!(config.store.max_open_conns, 10);
        // untouched sections keep their defaults
        assert_eq!(config.worker.file_timeout_secs, 600);
        assert_eq!(config.cleanup.api_log_retention_days, 30);
        assert_eq!(config.log.format, "pretty");
    }

    #[test]
    fn rejects_unknown_fields() {
        let toml = r#"
            [watch]
            paht = "/typo"
        "#;
        assert!(toml::from_str::<AppConfig>(toml).is_err());
    }

    #[test]
    fn validation_collects_every_failure() {
        let mut config = AppConfig::default();
        config.worker.count = 0;
        config.watch.queue_size = 0;
        config.log.format = "xml".to_string();

        let err = config.validate().expect_err("validation should fail");
        let message = err.to_string();
        assert!(message.contains("store.dsn is required"));
        assert!(message.contains("worker.count"));
        assert!(message.contains("watch.queue_size"));
        assert!(message.contains("log.format"));
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn normalization_makes_paths_absolute() {
        let mut config = base_config();
        config.normalize_paths();
        assert!(config.watch.path.is_absolute());
        assert!(config.report.archive_path.is_absolute());
    }
}
