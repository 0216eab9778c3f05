use arc_swap::ArcSwap;
use certsync_core::certificate::{CertificateRecord, normalize_hostname};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Immutable view of the store at one instant.
pub type Snapshot = HashMap<String, Arc<CertificateRecord>>;

/// One mutation of the store.
#[derive(Debug, Clone)]
pub enum StoreOp {
    Put(String, Arc<CertificateRecord>),
    Remove(String),
}

/// Hostname → certificate map read on every TLS handshake.
///
/// Readers do a single atomic snapshot load and never wait on writers.
/// Writers serialize on `write_lock`, build a new map and publish it with one
/// pointer swap, so a reader sees either the old or the new record for a
/// host, never anything in between.
pub struct CertStore {
    current: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
    version: AtomicU64,
}

impl CertStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
            version: AtomicU64::new(0),
        }
    }

    /// Look up the record for an SNI hostname.
    #[inline]
    pub fn get(&self, host: &str) -> Option<Arc<CertificateRecord>> {
        let host = normalize_hostname(host);
        self.current.load().get(host.as_ref()).cloned()
    }

    /// Insert or replace the record for `host`.
    pub fn put(&self, host: &str, record: Arc<CertificateRecord>) {
        self.apply([StoreOp::Put(host.to_string(), record)]);
    }

    /// Remove the record for `host`, returning what was there.
    pub fn remove(&self, host: &str) -> Option<Arc<CertificateRecord>> {
        let previous = self.get(host);
        self.apply([StoreOp::Remove(host.to_string())]);
        previous
    }

    /// Apply a batch of operations as a single snapshot swap.
    ///
    /// Returns how many operations changed the store. A batch that changes
    /// nothing does not publish a new snapshot.
    pub fn apply(&self, ops: impl IntoIterator<Item = StoreOp>) -> usize {
        let _guard = self.lock_writer();
        let mut next: Snapshot = (**self.current.load()).clone();
        let mut changed = 0;

        for op in ops {
            match op {
                StoreOp::Put(host, record) => {
                    let host = normalize_hostname(&host).into_owned();
                    let same = next.get(&host).is_some_and(|old| Arc::ptr_eq(old, &record));
                    if !same {
                        debug!(host = %host, fingerprint = %record.fingerprint(), "Store put");
                        next.insert(host, record);
                        changed += 1;
                    }
                }
                StoreOp::Remove(host) => {
                    let host = normalize_hostname(&host);
                    if next.remove(host.as_ref()).is_some() {
                        debug!(host = %host, "Store remove");
                        changed += 1;
                    }
                }
            }
        }

        if changed > 0 {
            self.current.store(Arc::new(next));
            self.version.fetch_add(1, Ordering::Release);
        }
        changed
    }

    /// Current snapshot; stays valid even if the store changes afterwards.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Sorted hostnames currently holding a record.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.current.load().keys().cloned().collect();
        hosts.sort();
        hosts
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Number of published snapshots since creation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // The guarded unit value cannot be left inconsistent by a panic.
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CertStore {
    fn default() -> Self {
        Self::new()
    }
}
