use crate::handlers::desired::WaitQuery;
use crate::server::{AdminState, error_response};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use certsync_core::{
    CertSyncError, CertificateRecord, SecretEvent, SecretEventKind, SecretMaterial, SecretRef,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::warn;

const TLS_CERT_KEY: &str = "tls.crt";
const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// Secret change shaped like a Kubernetes TLS secret.
#[derive(Debug, Deserialize)]
pub struct SecretRequest {
    pub kind: SecretEventKind,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub hosts: BTreeSet<String>,
    /// Base64 values keyed by `tls.crt` / `tls.key`.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    "default".into()
}

impl SecretRequest {
    fn into_event(self) -> Result<SecretEvent, CertSyncError> {
        let id = SecretRef::new(self.namespace, self.name);
        let event = match self.kind {
            SecretEventKind::Removed => SecretEvent::removed(id),
            kind => {
                let material = SecretMaterial {
                    certificate_pem: decode_field(&self.data, TLS_CERT_KEY)?,
                    private_key_pem: decode_field(&self.data, TLS_PRIVATE_KEY_KEY)?,
                };
                CertificateRecord::from_pem(
                    material.certificate_pem.clone(),
                    material.private_key_pem.clone(),
                    Some(id.clone()),
                )
                .map_err(|source| {
                    warn!(
                        secret = %id,
                        hosts = ?self.hosts,
                        error = %source,
                        "Malformed certificate material, keeping previous certificate"
                    );
                    CertSyncError::MalformedCertificate {
                        secret: id.to_string(),
                        source,
                    }
                })?;
                if kind == SecretEventKind::Added {
                    SecretEvent::added(id, material)
                } else {
                    SecretEvent::modified(id, material)
                }
            }
        };
        Ok(event.with_hosts(self.hosts))
    }
}

fn decode_field(data: &BTreeMap<String, String>, key: &str) -> Result<String, CertSyncError> {
    let encoded = data
        .get(key)
        .ok_or_else(|| CertSyncError::InvalidRequest(format!("missing data.{key}")))?;
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CertSyncError::InvalidRequest(format!("data.{key}: {e}")))?;
    String::from_utf8(raw)
        .map_err(|_| CertSyncError::InvalidRequest(format!("data.{key} is not PEM text")))
}

pub async fn post_secret(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<WaitQuery>,
    Json(request): Json<SecretRequest>,
) -> (StatusCode, Json<Value>) {
    let event = match request.into_event() {
        Ok(e) => e,
        Err(e) => return error_response(&e),
    };
    let id = event.identity.to_string();

    if let Err(e) = state.engine.submit_secret_event(event).await {
        return error_response(&e);
    }
    if !query.wait {
        return (StatusCode::ACCEPTED, Json(json!({"secret": id, "status": "queued"})));
    }
    if let Err(e) = state.engine.flush().await {
        return error_response(&e);
    }
    (StatusCode::OK, Json(json!({"secret": id, "status": "applied"})))
}
