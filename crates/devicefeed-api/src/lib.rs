//! Read API over the ingested data: files, rows, errors, reports,
//! plus a manual re-process hook into the watcher queue.

mod routes;
mod state;

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;
use tracing::{debug, info};

pub use state::ApiState;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/files", get(routes::list_files))
        .route("/api/v1/files/:filename", get(routes::get_file))
        .route("/api/v1/files/:filename/errors", get(routes::get_file_errors))
        .route("/api/v1/files/:filename/process", post(routes::process_file))
        .route("/api/v1/devices/:unit_guid/data", get(routes::get_device_data))
        .route("/api/v1/reports/:unit_guid", get(routes::get_reports))
        .route("/api/v1/statistics", get(routes::get_statistics))
        .layer(middleware::from_fn_with_state(state.clone(), record_api_log))
        .with_state(state)
}

/// Serve the read API until the shutdown signal fires.
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind API listener")?;
    info!(%addr, "starting API server");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("API server failed")
}

/// Record one api_logs row per request. Failures only surface in
/// logs; the response is never delayed by the insert.
async fn record_api_log(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status_code = response.status().as_u16() as i32;
    let elapsed_ms = started.elapsed().as_millis().min(i32::MAX as u128) as i32;
    let store = state.store.clone();
    tokio::spawn(async move {
        if let Err(err) = store
            .insert_api_log(&endpoint, &method, status_code, elapsed_ms, None)
            .await
        {
            debug!(error = %err, "failed to record api log");
        }
    });

    response
}
