use crate::handlers;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use certsync_core::CertSyncError;
use certsync_core::config::AdminConfig;
use certsync_engine::{CommittedState, EngineHandle, ReloadStatusHandle};
use certsync_observability::{EventLog, MetricsCollector};
use certsync_proxy::SniResolver;
use certsync_store::CertStore;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Shared state for the Admin API.
pub struct AdminState {
    pub store: Arc<CertStore>,
    pub resolver: Arc<SniResolver>,
    pub engine: EngineHandle,
    pub committed: CommittedState,
    pub status: ReloadStatusHandle,
    pub events: Arc<EventLog>,
    pub metrics: Arc<MetricsCollector>,
    /// Route serving Prometheus text, e.g. `/metrics`.
    pub metrics_path: String,
}

/// Build the Axum router with all admin routes.
pub fn build_admin_router(state: Arc<AdminState>) -> Router {
    let admin_api = Router::new()
        .route("/health", get(handlers::health::health_check))
        // Certificates
        .route("/certificates", get(handlers::certificates::list_certificates))
        .route("/certificates/{host}", get(handlers::certificates::resolve_host))
        // Observer inbound
        .route("/secrets", post(handlers::secrets::post_secret))
        .route(
            "/desired",
            get(handlers::desired::get_desired).put(handlers::desired::put_desired),
        )
        // Engine state
        .route("/events", get(handlers::reload::list_events))
        .route("/reload/status", get(handlers::reload::reload_status));

    let metrics_path = state.metrics_path.clone();
    Router::new()
        .nest("/certsync/admin", admin_api)
        .route(&metrics_path, get(metrics_handler))
        .with_state(state)
}

/// Serve the admin API until `shutdown` resolves.
pub async fn start_admin<F>(config: AdminConfig, state: Arc<AdminState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if !config.enabled {
        info!("Admin API disabled");
        return Ok(());
    }

    let app = build_admin_router(state);
    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    info!(addr = %config.addr, "Admin API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Prometheus metrics endpoint handler.
async fn metrics_handler(State(state): State<Arc<AdminState>>) -> Response {
    if !state.metrics.is_enabled() {
        return (StatusCode::NOT_FOUND, "metrics disabled\n").into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

/// JSON error response carrying the error's HTTP status.
pub(crate) fn error_response(err: &CertSyncError) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": err.to_string() })))
}
