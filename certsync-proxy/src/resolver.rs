use crate::default_cert::DefaultCertificateProvider;
use certsync_core::CertificateRecord;
use certsync_observability::MetricsCollector;
use certsync_store::CertStore;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Picks the certificate for a TLS handshake.
///
/// Exact hostname match in the store, otherwise the default certificate.
/// Lookups are a single atomic snapshot load; nothing here blocks or does
/// I/O, so it is safe to call from every connection concurrently.
pub struct SniResolver {
    store: Arc<CertStore>,
    default: Arc<DefaultCertificateProvider>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SniResolver {
    pub fn new(store: Arc<CertStore>, default: Arc<DefaultCertificateProvider>) -> Self {
        Self {
            store,
            default,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        if metrics.is_enabled() {
            self.metrics = Some(metrics);
        }
        self
    }

    /// Certificate for `server_name`, falling back to the default.
    pub fn resolve(&self, server_name: Option<&str>) -> Arc<CertificateRecord> {
        let found = server_name.and_then(|name| self.store.get(name));

        if let Some(ref m) = self.metrics {
            m.record_handshake(found.is_some());
        }

        match found {
            Some(record) => record,
            None => {
                trace!(sni = server_name.unwrap_or("-"), "Serving default certificate");
                self.default.get()
            }
        }
    }

    pub fn is_default(&self, record: &Arc<CertificateRecord>) -> bool {
        self.default.is_default(record)
    }
}

impl fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SniResolver")
            .field("hosts", &self.store.len())
            .field("store_version", &self.store.version())
            .finish()
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let record = SniResolver::resolve(self, client_hello.server_name());
        Some(Arc::clone(record.certified_key()))
    }
}
