use crate::server::AdminState;
use axum::extract::{Path, State};
use axum::response::Json;
use certsync_core::{CertificateRecord, normalize_hostname};
use serde_json::{Value, json};
use std::sync::Arc;

fn describe(record: &CertificateRecord) -> Value {
    json!({
        "hostnames": record.hostnames(),
        "issuer": record.issuer_common_name(),
        "source": record.source().map(|s| s.to_string()),
        "fingerprint": record.fingerprint(),
        "not_after": record.not_after(),
    })
}

pub async fn list_certificates(State(state): State<Arc<AdminState>>) -> Json<Value> {
    let snapshot = state.store.snapshot();
    let mut hosts: Vec<&String> = snapshot.keys().collect();
    hosts.sort();

    let list: Vec<Value> = hosts
        .into_iter()
        .map(|host| {
            let mut entry = describe(&snapshot[host]);
            entry["host"] = json!(host);
            entry
        })
        .collect();
    Json(json!({"list": list, "total": list.len()}))
}

/// What a handshake for `host` would be served right now.
pub async fn resolve_host(
    State(state): State<Arc<AdminState>>,
    Path(host): Path<String>,
) -> Json<Value> {
    let host = normalize_hostname(&host).into_owned();
    let record = state.resolver.resolve(Some(&host));
    let mut body = describe(&record);
    body["host"] = json!(host);
    body["default"] = json!(state.resolver.is_default(&record));
    Json(body)
}
