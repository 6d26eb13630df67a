use std::path::PathBuf;
use std::sync::Arc;

use devicefeed_core::DirectoryWatcher;
use devicefeed_store::Store;
use serde::Deserialize;

#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub watcher: Arc<DirectoryWatcher>,
    pub watch_dir: PathBuf,
}

/// Query-string pagination, clamped to sane bounds.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// File listing parameters: pagination plus an optional status filter.
#[derive(Debug, Default, Deserialize)]
pub struct FileListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

impl FileListParams {
    pub fn pagination(&self) -> PageParams {
        PageParams {
            page: self.page,
            limit: self.limit,
        }
    }
}

impl PageParams {
    pub fn resolve(&self, default_limit: i64) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(default_limit)
            .clamp(1, 100);
        (limit, (page - 1) * limit)
    }

    pub fn page_number(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }
}
