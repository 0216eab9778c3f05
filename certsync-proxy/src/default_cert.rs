use anyhow::Context;
use certsync_core::CertificateRecord;
use certsync_core::config::CertificatePaths;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::sync::Arc;
use tracing::info;

/// Issuer and subject CN of the generated fallback certificate.
pub const FAKE_CERTIFICATE_CN: &str = "Kubernetes Ingress Controller Fake Certificate";

const FAKE_CERTIFICATE_ORG: &str = "Acme Co";
const FAKE_CERTIFICATE_SAN: &str = "ingress.local";

/// Certificate served when no host-specific certificate applies.
///
/// Built once at startup and never replaced, so `get()` cannot fail.
pub struct DefaultCertificateProvider {
    record: Arc<CertificateRecord>,
}

impl DefaultCertificateProvider {
    /// Generate the self-signed fake certificate.
    pub fn generate() -> anyhow::Result<Self> {
        let key = KeyPair::generate().context("generating default certificate key")?;

        let mut params = CertificateParams::new(vec![FAKE_CERTIFICATE_SAN.to_string()])?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, FAKE_CERTIFICATE_CN);
        dn.push(DnType::OrganizationName, FAKE_CERTIFICATE_ORG);
        params.distinguished_name = dn;

        let cert = params
            .self_signed(&key)
            .context("self-signing default certificate")?;
        let record = CertificateRecord::from_pem(cert.pem(), key.serialize_pem(), None)?;

        info!(
            cn = FAKE_CERTIFICATE_CN,
            fingerprint = %record.fingerprint(),
            "Generated default certificate"
        );
        Ok(Self {
            record: Arc::new(record),
        })
    }

    /// Load an operator-supplied certificate from disk.
    pub fn load(paths: &CertificatePaths) -> anyhow::Result<Self> {
        let cert = std::fs::read(&paths.cert_path)
            .with_context(|| format!("reading {}", paths.cert_path.display()))?;
        let key = std::fs::read(&paths.key_path)
            .with_context(|| format!("reading {}", paths.key_path.display()))?;
        let record = CertificateRecord::from_pem(cert, key, None)
            .with_context(|| format!("parsing {}", paths.cert_path.display()))?;

        info!(
            path = %paths.cert_path.display(),
            issuer = %record.issuer_common_name(),
            "Loaded default certificate"
        );
        Ok(Self {
            record: Arc::new(record),
        })
    }

    /// Configured certificate if any, generated otherwise.
    pub fn from_config(paths: Option<&CertificatePaths>) -> anyhow::Result<Self> {
        match paths {
            Some(paths) => Self::load(paths),
            None => Self::generate(),
        }
    }

    #[inline]
    pub fn get(&self) -> Arc<CertificateRecord> {
        Arc::clone(&self.record)
    }

    pub fn is_default(&self, record: &Arc<CertificateRecord>) -> bool {
        Arc::ptr_eq(&self.record, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_certificate_is_the_fake_one() {
        let provider = DefaultCertificateProvider::generate().unwrap();
        let record = provider.get();
        assert_eq!(record.issuer_common_name(), FAKE_CERTIFICATE_CN);
        assert_eq!(record.hostnames(), &[FAKE_CERTIFICATE_SAN.to_string()]);
        assert!(record.source().is_none());
    }

    #[test]
    fn get_returns_the_same_record() {
        let provider = DefaultCertificateProvider::generate().unwrap();
        let a = provider.get();
        let b = provider.get();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(provider.is_default(&a));
    }

    #[test]
    fn is_default_rejects_other_records() {
        let provider = DefaultCertificateProvider::generate().unwrap();
        let other = DefaultCertificateProvider::generate().unwrap().get();
        assert!(!provider.is_default(&other));
    }

    #[test]
    fn load_reads_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["fallback.example".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        let paths = CertificatePaths {
            cert_path: dir.path().join("tls.crt"),
            key_path: dir.path().join("tls.key"),
        };
        std::fs::write(&paths.cert_path, cert.pem()).unwrap();
        std::fs::write(&paths.key_path, key.serialize_pem()).unwrap();

        let provider = DefaultCertificateProvider::from_config(Some(&paths)).unwrap();
        assert_eq!(provider.get().hostnames(), &["fallback.example".to_string()]);
    }

    #[test]
    fn load_missing_file_fails() {
        let paths = CertificatePaths {
            cert_path: "/nonexistent/tls.crt".into(),
            key_path: "/nonexistent/tls.key".into(),
        };
        assert!(DefaultCertificateProvider::load(&paths).is_err());
    }
}
