use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use devicefeed_core::{DiscoveryEntry, OfferError, DEFAULT_OFFER_TIMEOUT};
use devicefeed_store::FileStatus;
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use crate::state::{ApiState, FileListParams, PageParams};

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

fn internal(err: impl std::fmt::Display, message: &'static str) -> (StatusCode, Json<Value>) {
    error!(error = %err, "{message}");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

pub async fn health(State(state): State<ApiState>) -> ApiResult {
    match state.store.health_check().await {
        Ok(()) => Ok(Json(json!({ "status": "healthy" }))),
        Err(err) => {
            warn!(error = %err, "health check failed");
            Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "database connection failed",
            ))
        }
    }
}

pub async fn list_files(
    State(state): State<ApiState>,
    Query(params): Query<FileListParams>,
) -> ApiResult {
    let (limit, offset) = params.pagination().resolve(20);

    let files = match params.status.as_deref() {
        Some(raw) => {
            let status = FileStatus::from_str(raw).ok_or_else(|| {
                error_response(StatusCode::BAD_REQUEST, "invalid status filter")
            })?;
            state.store.list_files_by_status(status, limit, offset).await
        }
        None => state.store.list_files(limit, offset).await,
    }
    .map_err(|err| internal(err, "failed to fetch files"))?;

    Ok(Json(json!(files)))
}

pub async fn get_statistics(State(state): State<ApiState>) -> ApiResult {
    let statistics = state
        .store
        .statistics()
        .await
        .map_err(|err| internal(err, "failed to fetch statistics"))?;
    Ok(Json(json!(statistics)))
}

pub async fn get_file(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> ApiResult {
    let file = state
        .store
        .latest_file_by_filename(&filename)
        .await
        .map_err(|err| internal(err, "failed to fetch file"))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "file not found"))?;
    Ok(Json(json!(file)))
}

pub async fn get_file_errors(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> ApiResult {
    let file = state
        .store
        .latest_file_by_filename(&filename)
        .await
        .map_err(|err| internal(err, "failed to fetch file"))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "file not found"))?;

    let errors = state
        .store
        .errors_for_file(file.id)
        .await
        .map_err(|err| internal(err, "failed to fetch errors"))?;
    Ok(Json(json!(errors)))
}

pub async fn get_device_data(
    State(state): State<ApiState>,
    Path(unit_guid): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> ApiResult {
    let (limit, offset) = params.resolve(50);
    let data = state
        .store
        .device_data_by_unit(unit_guid, limit, offset)
        .await
        .map_err(|err| internal(err, "failed to fetch device data"))?;
    let total = state
        .store
        .count_device_data_by_unit(unit_guid)
        .await
        .map_err(|err| internal(err, "failed to count device data"))?;

    Ok(Json(json!({
        "data": data,
        "pagination": {
            "page": params.page_number(),
            "limit": limit,
            "total": total,
        },
    })))
}

pub async fn get_reports(
    State(state): State<ApiState>,
    Path(unit_guid): Path<Uuid>,
) -> ApiResult {
    let reports = state
        .store
        .reports_by_unit(unit_guid)
        .await
        .map_err(|err| internal(err, "failed to fetch reports"))?;
    Ok(Json(json!(reports)))
}

/// Re-offer a file from the watch directory to the processing queue.
pub async fn process_file(
    State(state): State<ApiState>,
    Path(filename): Path<String>,
) -> ApiResult {
    if filename.contains('/') || filename.contains("..") {
        return Err(error_response(StatusCode::BAD_REQUEST, "invalid filename"));
    }

    let path = state.watch_dir.join(&filename);
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| error_response(StatusCode::NOT_FOUND, "file not found"))?;

    let hash = devicefeed_core::watcher::hash_file(&path)
        .await
        .map_err(|err| internal(err, "failed to hash file"))?;

    let entry = DiscoveryEntry {
        path,
        filename: filename.clone(),
        size: metadata.len(),
        modified: metadata.modified().ok(),
        hash,
    };

    match state.watcher.offer(entry, DEFAULT_OFFER_TIMEOUT).await {
        Ok(()) => Ok(Json(json!({ "message": "file queued for processing" }))),
        Err(OfferError::Full(_)) => Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "processing queue is full",
        )),
        Err(OfferError::Closed) => Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "service is shutting down",
        )),
    }
}
