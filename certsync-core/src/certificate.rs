use crate::error::CertError;
use crate::secret::SecretRef;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rustls::pki_types::pem::{self, PemObject};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

/// One host's certificate material, parsed and ready for a TLS handshake.
///
/// Immutable once built. A newer version of a secret produces a new record
/// that replaces the old `Arc` in the store; nothing is mutated in place, so a
/// reader can never pair a new certificate with an old key.
pub struct CertificateRecord {
    hostnames: Vec<String>,
    certificate_pem: Bytes,
    private_key_pem: Bytes,
    issuer_common_name: String,
    source: Option<SecretRef>,
    fingerprint: String,
    not_after: Option<DateTime<Utc>>,
    certified_key: Arc<CertifiedKey>,
}

impl CertificateRecord {
    /// Parse and validate a PEM certificate chain and private key.
    ///
    /// Fails when the chain is empty, the key is missing or unsupported, or
    /// the key does not belong to the leaf certificate.
    pub fn from_pem(
        certificate_pem: impl Into<Bytes>,
        private_key_pem: impl Into<Bytes>,
        source: Option<SecretRef>,
    ) -> Result<Self, CertError> {
        let certificate_pem = certificate_pem.into();
        let private_key_pem = private_key_pem.into();

        let chain = CertificateDer::pem_slice_iter(&certificate_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CertError::Pem(format!("{e:?}")))?;
        let Some(leaf) = chain.first() else {
            return Err(CertError::NoCertificate);
        };

        let (hostnames, issuer_common_name, not_after) = inspect_leaf(leaf.as_ref())?;

        let key = PrivateKeyDer::from_pem_slice(&private_key_pem).map_err(|e| match e {
            pem::Error::NoItemsFound => CertError::NoPrivateKey,
            other => CertError::Pem(format!("{other:?}")),
        })?;

        let provider = rustls::crypto::ring::default_provider();
        let certified_key = CertifiedKey::from_der(chain, key, &provider)
            .map_err(|e| CertError::Key(e.to_string()))?;

        Ok(Self {
            hostnames,
            fingerprint: material_fingerprint(&certificate_pem, &private_key_pem),
            certificate_pem,
            private_key_pem,
            issuer_common_name,
            source,
            not_after,
            certified_key: Arc::new(certified_key),
        })
    }

    /// DNS names the certificate is valid for (SANs, or the subject CN).
    pub fn hostnames(&self) -> &[String] {
        &self.hostnames
    }

    pub fn certificate_pem(&self) -> &Bytes {
        &self.certificate_pem
    }

    pub fn private_key_pem(&self) -> &Bytes {
        &self.private_key_pem
    }

    pub fn issuer_common_name(&self) -> &str {
        &self.issuer_common_name
    }

    /// Secret this record was built from; `None` for the default certificate.
    pub fn source(&self) -> Option<&SecretRef> {
        self.source.as_ref()
    }

    /// Hex SHA-256 over the certificate and key PEM.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        self.not_after
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.not_after.is_some_and(|t| t <= now)
    }

    /// Key material handed to rustls during the handshake.
    pub fn certified_key(&self) -> &Arc<CertifiedKey> {
        &self.certified_key
    }

    pub fn covers(&self, host: &str) -> bool {
        let host = normalize_hostname(host);
        self.hostnames.iter().any(|h| *h == host)
    }
}

impl fmt::Debug for CertificateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateRecord")
            .field("hostnames", &self.hostnames)
            .field("issuer_common_name", &self.issuer_common_name)
            .field("source", &self.source)
            .field("fingerprint", &self.fingerprint)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Fingerprint of raw material, comparable with [`CertificateRecord::fingerprint`].
pub fn material_fingerprint(certificate_pem: &[u8], private_key_pem: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(certificate_pem);
    hasher.update(private_key_pem);
    format!("{:x}", hasher.finalize())
}

/// Canonical form of an SNI / host name: ASCII lowercase, no trailing dot.
///
/// Borrows when the input is already canonical so the handshake path does not
/// allocate for well-behaved clients.
pub fn normalize_hostname(host: &str) -> Cow<'_, str> {
    let trimmed = host.strip_suffix('.').unwrap_or(host);
    if trimmed.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(trimmed.to_ascii_lowercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}

fn inspect_leaf(der: &[u8]) -> Result<(Vec<String>, String, Option<DateTime<Utc>>), CertError> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| CertError::X509(e.to_string()))?;

    let mut hostnames = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                hostnames.push(normalize_hostname(dns).into_owned());
            }
        }
    }
    if hostnames.is_empty()
        && let Some(cn) = cert.subject().iter_common_name().next().and_then(|cn| cn.as_str().ok())
    {
        hostnames.push(normalize_hostname(cn).into_owned());
    }

    let issuer_common_name = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0);

    Ok((hostnames, issuer_common_name, not_after))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed(hosts: &[&str]) -> (String, String) {
        let key = rcgen::KeyPair::generate().unwrap();
        let params =
            rcgen::CertificateParams::new(hosts.iter().map(|h| h.to_string()).collect::<Vec<_>>())
                .unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    #[test]
    fn parses_hostnames_and_issuer() {
        let (cert, key) = self_signed(&["foo.com", "www.foo.com"]);
        let record =
            CertificateRecord::from_pem(cert, key, Some(SecretRef::new("default", "foo.com")))
                .unwrap();
        assert_eq!(record.hostnames(), &["foo.com".to_string(), "www.foo.com".to_string()]);
        assert_eq!(record.issuer_common_name(), "rcgen self signed cert");
        assert_eq!(record.source().unwrap().to_string(), "default/foo.com");
        assert!(record.not_after().is_some());
        assert!(record.covers("WWW.foo.com."));
        assert!(!record.covers("bar.com"));
    }

    #[test]
    fn fingerprint_matches_raw_material() {
        let (cert, key) = self_signed(&["foo.com"]);
        let expected = material_fingerprint(cert.as_bytes(), key.as_bytes());
        let record = CertificateRecord::from_pem(cert, key, None).unwrap();
        assert_eq!(record.fingerprint(), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn empty_certificate_is_rejected() {
        let (_, key) = self_signed(&["foo.com"]);
        let err = CertificateRecord::from_pem("", key, None).unwrap_err();
        assert_eq!(err, CertError::NoCertificate);
    }

    #[test]
    fn missing_key_is_rejected() {
        let (cert, _) = self_signed(&["foo.com"]);
        let err = CertificateRecord::from_pem(cert, "not a key", None).unwrap_err();
        assert_eq!(err, CertError::NoPrivateKey);
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let (cert, _) = self_signed(&["foo.com"]);
        let (_, other_key) = self_signed(&["bar.com"]);
        let err = CertificateRecord::from_pem(cert, other_key, None).unwrap_err();
        assert!(matches!(err, CertError::Key(_)), "got {err:?}");
    }

    #[test]
    fn debug_output_hides_key_material() {
        let (cert, key) = self_signed(&["foo.com"]);
        let record = CertificateRecord::from_pem(cert, key.clone(), None).unwrap();
        let dbg = format!("{record:?}");
        assert!(dbg.contains("foo.com"));
        assert!(!dbg.contains("PRIVATE KEY"));
    }

    #[test]
    fn normalize_lowercases_and_strips_trailing_dot() {
        assert_eq!(normalize_hostname("Foo.COM."), "foo.com");
        assert!(matches!(normalize_hostname("foo.com"), Cow::Borrowed("foo.com")));
        assert!(matches!(normalize_hostname("foo.com."), Cow::Borrowed("foo.com")));
    }
}
