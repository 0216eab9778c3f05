use certsync_core::certificate::{CertificateRecord, material_fingerprint};
use certsync_core::error::CertError;
use certsync_core::secret::{SecretEvent, SecretEventKind, SecretRef};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Effect of one secret event on the cache.
#[derive(Debug, Clone)]
pub enum SecretChange {
    /// Duplicate delivery or removal of an unknown secret.
    Unchanged,
    Updated(Arc<CertificateRecord>),
    Removed,
}

impl SecretChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, SecretChange::Unchanged)
    }
}

/// Latest valid certificate material per secret.
///
/// Fed by the secret-change observer and consulted by the engine whenever a
/// host is (re)bound to a secret. Invalid material never replaces a valid
/// entry.
#[derive(Clone, Default)]
pub struct SecretCache {
    secrets: Arc<DashMap<SecretRef, Arc<CertificateRecord>>>,
}

impl SecretCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a change event.
    ///
    /// Re-applying an event is a no-op: identical material is detected by
    /// fingerprint before parsing, and removing an absent secret changes
    /// nothing.
    pub fn apply(&self, event: &SecretEvent) -> Result<SecretChange, CertError> {
        let id = &event.identity;
        match event.kind {
            SecretEventKind::Added | SecretEventKind::Modified => {
                let material = event.material.as_ref().ok_or(CertError::MissingMaterial)?;
                let fingerprint = material_fingerprint(
                    material.certificate_pem.as_bytes(),
                    material.private_key_pem.as_bytes(),
                );
                let unchanged = self
                    .secrets
                    .get(id)
                    .is_some_and(|existing| existing.fingerprint() == fingerprint);
                if unchanged {
                    debug!(secret = %id, "Secret unchanged, ignoring duplicate");
                    return Ok(SecretChange::Unchanged);
                }

                let record = Arc::new(CertificateRecord::from_pem(
                    material.certificate_pem.clone(),
                    material.private_key_pem.clone(),
                    Some(id.clone()),
                )?);
                self.secrets.insert(id.clone(), Arc::clone(&record));
                debug!(secret = %id, fingerprint = %record.fingerprint(), "Secret cached");
                Ok(SecretChange::Updated(record))
            }
            SecretEventKind::Removed => {
                if self.secrets.remove(id).is_some() {
                    debug!(secret = %id, "Secret removed from cache");
                    Ok(SecretChange::Removed)
                } else {
                    Ok(SecretChange::Unchanged)
                }
            }
        }
    }

    pub fn get(&self, id: &SecretRef) -> Option<Arc<CertificateRecord>> {
        self.secrets.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, id: &SecretRef) -> bool {
        self.secrets.contains_key(id)
    }

    /// Sorted identities of cached secrets.
    pub fn ids(&self) -> Vec<SecretRef> {
        let mut ids: Vec<SecretRef> = self.secrets.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certsync_core::secret::SecretMaterial;

    fn material(hosts: &[&str]) -> SecretMaterial {
        let key = rcgen::KeyPair::generate().unwrap();
        let params =
            rcgen::CertificateParams::new(hosts.iter().map(|h| h.to_string()).collect::<Vec<_>>())
                .unwrap();
        let cert = params.self_signed(&key).unwrap();
        SecretMaterial {
            certificate_pem: cert.pem(),
            private_key_pem: key.serialize_pem(),
        }
    }

    fn id() -> SecretRef {
        SecretRef::new("default", "foo.com")
    }

    // ── Added / Modified ────────────────────────────────────────

    #[test]
    fn added_secret_is_cached() {
        let cache = SecretCache::new();
        let change = cache.apply(&SecretEvent::added(id(), material(&["foo.com"]))).unwrap();
        assert!(matches!(change, SecretChange::Updated(_)));
        let record = cache.get(&id()).unwrap();
        assert_eq!(record.hostnames(), &["foo.com".to_string()]);
        assert_eq!(record.source(), Some(&id()));
    }

    #[test]
    fn duplicate_event_is_unchanged() {
        let cache = SecretCache::new();
        let event = SecretEvent::added(id(), material(&["foo.com"]));
        cache.apply(&event).unwrap();
        let first = cache.get(&id()).unwrap();

        let change = cache.apply(&event).unwrap();
        assert!(!change.is_change());
        assert!(Arc::ptr_eq(&cache.get(&id()).unwrap(), &first));
    }

    #[test]
    fn modified_secret_replaces_record() {
        let cache = SecretCache::new();
        cache.apply(&SecretEvent::added(id(), material(&["foo.com"]))).unwrap();
        let old = cache.get(&id()).unwrap();
        cache
            .apply(&SecretEvent::modified(id(), material(&["foo.com", "www.foo.com"])))
            .unwrap();
        let new = cache.get(&id()).unwrap();
        assert_ne!(old.fingerprint(), new.fingerprint());
        assert_eq!(new.hostnames().len(), 2);
    }

    // ── Malformed material ──────────────────────────────────────

    #[test]
    fn malformed_update_keeps_previous_record() {
        let cache = SecretCache::new();
        cache.apply(&SecretEvent::added(id(), material(&["foo.com"]))).unwrap();
        let good = cache.get(&id()).unwrap();

        let bad = SecretEvent::modified(
            id(),
            SecretMaterial {
                certificate_pem: "-----BEGIN CERTIFICATE-----\ngarbage\n-----END CERTIFICATE-----\n".into(),
                private_key_pem: "nope".into(),
            },
        );
        assert!(cache.apply(&bad).is_err());
        assert!(Arc::ptr_eq(&cache.get(&id()).unwrap(), &good));
    }

    #[test]
    fn added_without_material_is_rejected() {
        let cache = SecretCache::new();
        let mut event = SecretEvent::removed(id());
        event.kind = SecretEventKind::Added;
        assert_eq!(cache.apply(&event).unwrap_err(), CertError::MissingMaterial);
        assert!(cache.is_empty());
    }

    // ── Removed ─────────────────────────────────────────────────

    #[test]
    fn removed_secret_is_dropped_once() {
        let cache = SecretCache::new();
        cache.apply(&SecretEvent::added(id(), material(&["foo.com"]))).unwrap();
        assert!(matches!(
            cache.apply(&SecretEvent::removed(id())).unwrap(),
            SecretChange::Removed
        ));
        assert!(!cache.contains(&id()));
        assert!(!cache.apply(&SecretEvent::removed(id())).unwrap().is_change());
    }

    #[test]
    fn ids_are_sorted() {
        let cache = SecretCache::new();
        let b = SecretRef::new("default", "b");
        let a = SecretRef::new("default", "a");
        cache.apply(&SecretEvent::added(b.clone(), material(&["b.com"]))).unwrap();
        cache.apply(&SecretEvent::added(a.clone(), material(&["a.com"]))).unwrap();
        assert_eq!(cache.ids(), vec![a, b]);
        assert_eq!(cache.len(), 2);
    }
}
