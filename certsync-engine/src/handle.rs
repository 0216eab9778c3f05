use crate::engine::ReloadEngine;
use certsync_core::{CertSyncError, DesiredState, SecretEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Messages accepted by the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    Desired(DesiredState),
    Secret(SecretEvent),
    /// Answered once every command queued before it has been processed.
    Flush(oneshot::Sender<()>),
}

/// Cloneable inbound port of the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Start `engine` on its own task.
    pub fn spawn(engine: ReloadEngine, capacity: usize) -> (Self, JoinHandle<()>) {
        let (handle, rx) = Self::channel(capacity);
        let task = tokio::spawn(engine.run(rx));
        (handle, task)
    }

    pub async fn submit_desired_state(&self, desired: DesiredState) -> Result<(), CertSyncError> {
        let desired = desired.normalized();
        desired.validate()?;
        self.send(EngineCommand::Desired(desired)).await
    }

    pub async fn submit_secret_event(&self, event: SecretEvent) -> Result<(), CertSyncError> {
        self.send(EngineCommand::Secret(event)).await
    }

    /// Wait until everything submitted so far has been reconciled.
    pub async fn flush(&self) -> Result<(), CertSyncError> {
        let (done, wait) = oneshot::channel();
        self.send(EngineCommand::Flush(done)).await?;
        wait.await.map_err(|_| stopped())
    }

    async fn send(&self, cmd: EngineCommand) -> Result<(), CertSyncError> {
        self.tx.send(cmd).await.map_err(|_| stopped())
    }
}

fn stopped() -> CertSyncError {
    CertSyncError::Internal("reload engine stopped".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use certsync_core::{HostConfig, SecretRef};
    use certsync_observability::EventLog;
    use certsync_store::CertStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn flush_waits_for_reconciliation() {
        let engine = ReloadEngine::new(Arc::new(CertStore::new()), Arc::new(EventLog::new(16)));
        let committed = engine.committed();
        let (handle, _task) = EngineHandle::spawn(engine, 8);

        let desired = DesiredState::new().with_host("foo.com", HostConfig::default().with_route("/", "a"));
        handle.submit_desired_state(desired.clone()).await.unwrap();
        handle.flush().await.unwrap();

        assert_eq!(**committed.load(), desired);
    }

    #[tokio::test]
    async fn hostnames_are_normalized_on_submit() {
        let engine = ReloadEngine::new(Arc::new(CertStore::new()), Arc::new(EventLog::new(16)));
        let committed = engine.committed();
        let (handle, _task) = EngineHandle::spawn(engine, 8);

        let mut desired = DesiredState::new();
        desired.hosts.insert(
            "FOO.com.".into(),
            HostConfig::default().with_tls(Some(SecretRef::new("default", "foo"))),
        );
        handle.submit_desired_state(desired).await.unwrap();
        handle.flush().await.unwrap();

        assert!(committed.load().host("foo.com").is_some());
        assert!(committed.load().hosts.contains_key("foo.com"));
    }

    #[tokio::test]
    async fn empty_hostname_is_rejected() {
        let (handle, _rx) = EngineHandle::channel(1);
        let mut desired = DesiredState::new();
        desired.hosts.insert(String::new(), HostConfig::default());
        let err = handle.submit_desired_state(desired).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn closed_engine_reports_error() {
        let (handle, rx) = EngineHandle::channel(1);
        drop(rx);
        assert!(handle.flush().await.is_err());
    }
}
