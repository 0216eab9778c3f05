use crate::server::{AdminState, error_response};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use certsync_core::DesiredState;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// `?wait=true` holds the response until the engine has processed the
/// submission.
#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    #[serde(default)]
    pub wait: bool,
}

pub async fn put_desired(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<WaitQuery>,
    Json(desired): Json<DesiredState>,
) -> (StatusCode, Json<Value>) {
    let hosts = desired.hosts.len();
    if let Err(e) = state.engine.submit_desired_state(desired).await {
        return error_response(&e);
    }
    if !query.wait {
        return (StatusCode::ACCEPTED, Json(json!({"hosts": hosts, "status": "queued"})));
    }
    if let Err(e) = state.engine.flush().await {
        return error_response(&e);
    }
    (
        StatusCode::OK,
        Json(json!({"hosts": hosts, "status": "applied", "reload": state.status.get()})),
    )
}

/// Last committed snapshot and whether a newer one awaits a reload.
pub async fn get_desired(State(state): State<Arc<AdminState>>) -> Json<Value> {
    let committed = state.committed.load_full();
    Json(json!({
        "committed": *committed,
        "pending": state.status.get().pending,
    }))
}
