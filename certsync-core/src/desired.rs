use crate::certificate::normalize_hostname;
use crate::error::CertSyncError;
use crate::secret::SecretRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Desired configuration snapshot produced by the orchestration layer.
///
/// Keys are hostnames. Everything except the secret reference inside
/// [`TlsBinding`] is structural: changing it requires the proxy
/// configuration to be regenerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
}

/// Per-host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Present when the host is served over TLS.
    #[serde(default)]
    pub tls: Option<TlsBinding>,

    /// Extra listen ports; empty means the proxy defaults.
    #[serde(default)]
    pub listen: BTreeSet<u16>,

    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// TLS binding of a host. A binding without a secret is served with the
/// default certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsBinding {
    #[serde(default)]
    pub secret: Option<SecretRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub path: String,
    pub backend: String,
    #[serde(default)]
    pub port: Option<u16>,
}

/// The parts of a host that end up in the generated proxy configuration.
#[derive(Debug, PartialEq, Eq)]
pub struct StructuralAttributes<'a> {
    pub tls: bool,
    pub listen: &'a BTreeSet<u16>,
    pub routes: &'a [RouteRule],
}

impl HostConfig {
    pub fn structural(&self) -> StructuralAttributes<'_> {
        StructuralAttributes {
            tls: self.tls.is_some(),
            listen: &self.listen,
            routes: &self.routes,
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn tls_secret(&self) -> Option<&SecretRef> {
        self.tls.as_ref().and_then(|t| t.secret.as_ref())
    }

    pub fn with_route(mut self, path: &str, backend: &str) -> Self {
        self.routes.push(RouteRule {
            path: path.to_string(),
            backend: backend.to_string(),
            port: None,
        });
        self
    }

    pub fn with_tls(mut self, secret: Option<SecretRef>) -> Self {
        self.tls = Some(TlsBinding { secret });
        self
    }

    pub fn without_tls(mut self) -> Self {
        self.tls = None;
        self
    }
}

impl DesiredState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, normalizing the hostname.
    pub fn with_host(mut self, host: &str, config: HostConfig) -> Self {
        self.hosts.insert(normalize_hostname(host).into_owned(), config);
        self
    }

    pub fn host(&self, host: &str) -> Option<&HostConfig> {
        self.hosts.get(normalize_hostname(host).as_ref())
    }

    /// Hostnames served over TLS.
    pub fn tls_hosts(&self) -> impl Iterator<Item = (&str, &HostConfig)> {
        self.hosts
            .iter()
            .filter(|(_, h)| h.is_tls())
            .map(|(name, h)| (name.as_str(), h))
    }

    /// TLS hostnames bound to `secret`.
    pub fn hosts_bound_to<'a>(&'a self, secret: &'a SecretRef) -> impl Iterator<Item = &'a str> {
        self.tls_hosts()
            .filter(move |(_, h)| h.tls_secret() == Some(secret))
            .map(|(name, _)| name)
    }

    /// Every secret referenced by a TLS binding.
    pub fn referenced_secrets(&self) -> BTreeSet<&SecretRef> {
        self.tls_hosts().filter_map(|(_, h)| h.tls_secret()).collect()
    }

    /// Reject snapshots whose keys are not canonical hostnames.
    pub fn validate(&self) -> Result<(), CertSyncError> {
        for name in self.hosts.keys() {
            if name.is_empty() {
                return Err(CertSyncError::InvalidDesiredState("empty hostname".into()));
            }
            if normalize_hostname(name) != name.as_str() {
                return Err(CertSyncError::InvalidDesiredState(format!(
                    "hostname {name:?} is not normalized"
                )));
            }
        }
        Ok(())
    }

    /// Re-key every host with its canonical hostname.
    pub fn normalized(self) -> Self {
        Self {
            hosts: self
                .hosts
                .into_iter()
                .map(|(name, cfg)| (normalize_hostname(&name).into_owned(), cfg))
                .collect(),
        }
    }

    /// Load a snapshot from a YAML (or JSON) file.
    pub fn load(path: &Path) -> Result<Self, CertSyncError> {
        let raw = std::fs::read_to_string(path)?;
        let state: DesiredState = serde_yaml::from_str(&raw)
            .map_err(|e| CertSyncError::InvalidDesiredState(e.to_string()))?;
        let state = state.normalized();
        state.validate()?;
        Ok(state)
    }
}
