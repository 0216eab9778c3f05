use crate::handle::EngineCommand;
use crate::reloader::{ConfigReloader, NoopReloader, ReloadError};
use crate::status::ReloadStatusHandle;
use arc_swap::ArcSwap;
use certsync_core::config::EngineConfig;
use certsync_core::diff::classify;
use certsync_core::{ChangeSet, DesiredState, ReloadClass, SecretEvent, SecretRef};
use certsync_observability::{EventLog, MetricsCollector, ReloadEventKind};
use certsync_store::{CertStore, SecretCache, StoreOp};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Last snapshot the proxy configuration was successfully generated from.
pub type CommittedState = Arc<ArcSwap<DesiredState>>;

/// What one reconciliation pass did.
#[derive(Debug)]
pub struct Outcome {
    pub changes: ChangeSet,
    /// Result of the reload collaborator, when it was called.
    pub reload: Option<Result<(), ReloadError>>,
    /// Secrets whose material was rejected this pass.
    pub rejected: Vec<SecretRef>,
}

impl Outcome {
    pub fn class(&self) -> ReloadClass {
        self.changes.class
    }

    pub fn reloaded(&self) -> bool {
        matches!(self.reload, Some(Ok(())))
    }
}

/// Decides, per batch of changes, whether the proxy must be reloaded.
///
/// Certificate-only changes are applied to the [`CertStore`] and never reach
/// the reload collaborator. Structural changes go through it, bounded by
/// `reload_timeout`. Owned by a single task; passes never overlap.
pub struct ReloadEngine {
    store: Arc<CertStore>,
    secrets: SecretCache,
    events: Arc<EventLog>,
    metrics: Arc<MetricsCollector>,
    reloader: Arc<dyn ConfigReloader>,
    status: ReloadStatusHandle,
    committed: CommittedState,
    /// Latest submitted snapshot. Differs from `committed` only while a
    /// structural change is waiting for a successful reload.
    desired: Arc<DesiredState>,
    /// Snapshot the store was last synchronized against.
    synced: Arc<DesiredState>,
    dynamic_certificates: bool,
    reload_timeout: Duration,
}

impl ReloadEngine {
    pub fn new(store: Arc<CertStore>, events: Arc<EventLog>) -> Self {
        let empty = Arc::new(DesiredState::default());
        Self {
            store,
            secrets: SecretCache::new(),
            events,
            metrics: Arc::new(MetricsCollector::disabled()),
            reloader: Arc::new(NoopReloader),
            status: ReloadStatusHandle::new(),
            committed: Arc::new(ArcSwap::new(Arc::clone(&empty))),
            desired: Arc::clone(&empty),
            synced: empty,
            dynamic_certificates: true,
            reload_timeout: Duration::from_millis(10_000),
        }
    }

    pub fn from_config(
        config: &EngineConfig,
        store: Arc<CertStore>,
        events: Arc<EventLog>,
        reloader: Arc<dyn ConfigReloader>,
    ) -> Self {
        Self::new(store, events)
            .with_reloader(reloader)
            .with_dynamic_certificates(config.dynamic_certificates)
            .with_reload_timeout(Duration::from_millis(config.reload_timeout_ms))
    }

    pub fn with_reloader(mut self, reloader: Arc<dyn ConfigReloader>) -> Self {
        self.reloader = reloader;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_dynamic_certificates(mut self, enabled: bool) -> Self {
        self.dynamic_certificates = enabled;
        self
    }

    pub fn with_reload_timeout(mut self, timeout: Duration) -> Self {
        self.reload_timeout = timeout;
        self
    }

    pub fn status(&self) -> ReloadStatusHandle {
        self.status.clone()
    }

    pub fn committed(&self) -> CommittedState {
        Arc::clone(&self.committed)
    }

    pub fn secrets(&self) -> &SecretCache {
        &self.secrets
    }

    pub fn store(&self) -> &Arc<CertStore> {
        &self.store
    }

    /// Run one pass: apply `events`, classify `committed → next`, act.
    ///
    /// `next = None` keeps the latest submitted snapshot, so a secret-only
    /// batch is classified against an unchanged desired state (and retries a
    /// structural change whose reload previously failed).
    pub async fn reconcile(
        &mut self,
        next: Option<DesiredState>,
        events: Vec<SecretEvent>,
    ) -> Outcome {
        if let Some(next) = next {
            self.desired = Arc::new(next.normalized());
        }
        let next = Arc::clone(&self.desired);
        let prev = self.committed.load_full();

        let (changed, rejected) = self.apply_secret_events(&events);

        let mut changes = classify(&prev, &next, &changed);
        if !self.dynamic_certificates {
            changes = changes.without_dynamic_certificates();
        }

        let reload = match changes.class {
            ReloadClass::NoChange => {
                // A failed structural change can leave the store ahead of the
                // committed snapshot; a pass that returns to it catches up.
                if *self.synced != *next {
                    info!("Desired state returned to committed configuration, resynchronizing store");
                    self.sync_store(&next);
                    self.status.settled();
                } else {
                    debug!(events = events.len(), "No effective change");
                }
                None
            }
            ReloadClass::CertificateOnly => {
                self.sync_store(&next);
                self.emit(ReloadEventKind::ReloadSkipped, &changes.certificate_hosts);
                self.committed.store(next);
                self.status.settled();
                None
            }
            ReloadClass::StructuralReload => {
                let hosts = changes.hosts();
                self.emit(ReloadEventKind::ReloadRequired, &hosts);
                self.sync_store(&next);
                Some(self.reload(next, &hosts).await)
            }
        };

        Outcome {
            changes,
            reload,
            rejected,
        }
    }

    /// Drain commands in batches until every handle is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<EngineCommand>) {
        info!(
            dynamic_certificates = self.dynamic_certificates,
            reloader = self.reloader.name(),
            "Reload engine started"
        );

        while let Some(first) = rx.recv().await {
            let mut next = None;
            let mut events = Vec::new();
            let mut flushes = Vec::new();

            let mut queued = Some(first);
            while let Some(cmd) = queued.take().or_else(|| rx.try_recv().ok()) {
                match cmd {
                    EngineCommand::Desired(state) => next = Some(state),
                    EngineCommand::Secret(event) => events.push(event),
                    EngineCommand::Flush(done) => flushes.push(done),
                }
            }

            if next.is_some() || !events.is_empty() {
                let outcome = self.reconcile(next, events).await;
                debug!(class = %outcome.class(), "Pass complete");
            }
            for done in flushes {
                let _ = done.send(());
            }
        }

        info!("Reload engine stopped");
    }

    /// Feed events to the secret cache. Returns the secrets whose effective
    /// content changed and those whose material was rejected.
    fn apply_secret_events(&self, events: &[SecretEvent]) -> (BTreeSet<SecretRef>, Vec<SecretRef>) {
        let mut changed = BTreeSet::new();
        let mut rejected = Vec::new();
        for event in events {
            match self.secrets.apply(event) {
                Ok(change) if change.is_change() => {
                    changed.insert(event.identity.clone());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        secret = %event.identity,
                        hosts = ?event.host_bindings,
                        error = %e,
                        "Malformed certificate material, keeping previous certificate"
                    );
                    rejected.push(event.identity.clone());
                }
            }
        }
        (changed, rejected)
    }

    /// Make the store match `desired`: TLS hosts with a cached secret get its
    /// record, everything else is removed and served the default.
    fn sync_store(&mut self, desired: &Arc<DesiredState>) {
        let mut ops = Vec::new();
        let mut keep = BTreeSet::new();

        for (host, config) in desired.tls_hosts() {
            match config.tls_secret().and_then(|id| self.secrets.get(id)) {
                Some(record) => {
                    keep.insert(host);
                    ops.push(StoreOp::Put(host.to_string(), record));
                }
                None => {
                    debug!(host = %host, "No certificate available, host uses default");
                }
            }
        }
        for host in self.store.hosts() {
            if !keep.contains(host.as_str()) {
                ops.push(StoreOp::Remove(host));
            }
        }

        let applied = self.store.apply(ops);
        self.synced = Arc::clone(desired);
        self.metrics.set_store_entries(self.store.len());
        debug!(applied, entries = self.store.len(), "Certificate store synchronized");
    }

    async fn reload(&mut self, next: Arc<DesiredState>, hosts: &BTreeSet<String>) -> Result<(), ReloadError> {
        self.status.started();

        let result = match tokio::time::timeout(self.reload_timeout, self.reloader.reload(&next)).await {
            Ok(result) => result,
            Err(_) => Err(ReloadError::Timeout(self.reload_timeout)),
        };

        match result {
            Ok(()) => {
                self.committed.store(next);
                self.status.succeeded();
                self.emit(ReloadEventKind::ReloadSucceeded, hosts);
                Ok(())
            }
            Err(e) => {
                error!(
                    reloader = self.reloader.name(),
                    error = %e,
                    "Backend reload failed, keeping previous configuration"
                );
                self.metrics.record_reload_failure();
                self.status.failed(e.to_string());
                Err(e)
            }
        }
    }

    fn emit(&self, kind: ReloadEventKind, hosts: &BTreeSet<String>) {
        self.events.emit(kind, hosts.iter().cloned());
        self.metrics.record_reload_event(kind);
    }
}
