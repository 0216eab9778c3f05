use crate::server::AdminState;
use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Only events with a larger sequence number.
    #[serde(default)]
    pub since: u64,
}

pub async fn list_events(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<EventsQuery>,
) -> Json<Value> {
    let events = state.events.events_since(query.since);
    Json(json!({
        "list": events,
        "total": events.len(),
        "last_seq": state.events.last_seq(),
    }))
}

pub async fn reload_status(State(state): State<Arc<AdminState>>) -> Json<Value> {
    Json(json!(state.status.get()))
}
