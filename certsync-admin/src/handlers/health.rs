use crate::server::AdminState;
use axum::extract::State;
use axum::response::Json;
use serde_json::{Value, json};
use std::sync::Arc;

pub async fn health_check(State(state): State<Arc<AdminState>>) -> Json<Value> {
    let status = state.status.get();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "certificates": state.store.len(),
        "store_version": state.store.version(),
        "reload": {
            "state": status.state,
            "pending": status.pending,
        },
    }))
}
