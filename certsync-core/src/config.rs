use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level certsync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertSyncConfig {
    #[serde(default)]
    pub tls: TlsListenerConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// TLS data plane listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsListenerConfig {
    #[serde(default = "default_tls_addr")]
    pub addr: String,
    /// Operator-supplied fallback certificate. When unset a self-signed
    /// "fake" certificate is generated at startup.
    #[serde(default)]
    pub default_certificate: Option<CertificatePaths>,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificatePaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Admin API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub addr: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Reload decision engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Serve certificate changes from the store without reloading. When
    /// false every certificate change is treated as structural.
    #[serde(default = "default_true")]
    pub dynamic_certificates: bool,
    #[serde(default = "default_reload_timeout")]
    pub reload_timeout_ms: u64,
    /// Command run after the snapshot is rendered, e.g. `["nginx", "-s", "reload"]`.
    /// Unset means standalone mode: reloads always succeed.
    #[serde(default)]
    pub reload_command: Option<Vec<String>>,
    #[serde(default = "default_rendered_config_path")]
    pub rendered_config_path: PathBuf,
    /// Snapshot applied once at startup.
    #[serde(default)]
    pub desired_state_path: Option<PathBuf>,
    /// Number of reload events kept in memory.
    #[serde(default = "default_event_history")]
    pub event_history: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Observability settings, disabled by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, the handshake path touches no counters.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_tls_addr() -> String { "0.0.0.0:9443".into() }
fn default_admin_addr() -> String { "0.0.0.0:9180".into() }
fn default_handshake_timeout() -> u64 { 5000 }
fn default_true() -> bool { true }
fn default_reload_timeout() -> u64 { 10_000 }
fn default_rendered_config_path() -> PathBuf { PathBuf::from("/tmp/certsync/desired.json") }
fn default_event_history() -> usize { 1024 }
fn default_queue_capacity() -> usize { 4096 }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for TlsListenerConfig {
    fn default() -> Self {
        Self {
            addr: default_tls_addr(),
            default_certificate: None,
            handshake_timeout_ms: default_handshake_timeout(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            addr: default_admin_addr(),
            enabled: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dynamic_certificates: true,
            reload_timeout_ms: default_reload_timeout(),
            reload_command: None,
            rendered_config_path: default_rendered_config_path(),
            desired_state_path: None,
            event_history: default_event_history(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl CertSyncConfig {
    /// Load configuration from YAML file + env overrides
    /// (`CERTSYNC_ENGINE__RELOAD_TIMEOUT_MS=500`).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: CertSyncConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("CERTSYNC_").split("__"))
            .extract()?;
        Ok(config)
    }
}
