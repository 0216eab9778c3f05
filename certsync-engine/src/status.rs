use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadState {
    /// No reload attempted yet.
    #[default]
    Idle,
    InProgress,
    Succeeded,
    Failed,
}

/// Outcome of the most recent reload attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadStatus {
    pub state: ReloadState,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// A structural change has not been applied yet.
    pub pending: bool,
    pub consecutive_failures: u32,
    pub total_reloads: u64,
}

/// Shared, lock-free view of [`ReloadStatus`].
///
/// Written only by the engine task, read by anyone.
#[derive(Clone, Default)]
pub struct ReloadStatusHandle {
    inner: Arc<ArcSwap<ReloadStatus>>,
}

impl ReloadStatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ReloadStatus {
        ReloadStatus::clone(&self.inner.load())
    }

    pub(crate) fn started(&self) {
        self.update(|s| {
            s.state = ReloadState::InProgress;
            s.last_attempt = Some(Utc::now());
            s.pending = true;
        });
    }

    pub(crate) fn succeeded(&self) {
        self.update(|s| {
            s.state = ReloadState::Succeeded;
            s.last_success = Some(Utc::now());
            s.last_error = None;
            s.pending = false;
            s.consecutive_failures = 0;
            s.total_reloads += 1;
        });
    }

    pub(crate) fn failed(&self, error: String) {
        self.update(|s| {
            s.state = ReloadState::Failed;
            s.last_error = Some(error);
            s.consecutive_failures += 1;
        });
    }

    /// Desired and committed agree again without a reload.
    pub(crate) fn settled(&self) {
        if self.inner.load().pending {
            self.update(|s| s.pending = false);
        }
    }

    fn update(&self, f: impl FnOnce(&mut ReloadStatus)) {
        let mut next = self.get();
        f(&mut next);
        self.inner.store(Arc::new(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let status = ReloadStatusHandle::new().get();
        assert_eq!(status.state, ReloadState::Idle);
        assert!(!status.pending);
        assert!(status.last_attempt.is_none());
    }

    #[test]
    fn failure_then_success_resets_counter() {
        let handle = ReloadStatusHandle::new();
        handle.started();
        handle.failed("boom".into());
        handle.started();
        handle.failed("boom again".into());

        let failed = handle.get();
        assert_eq!(failed.state, ReloadState::Failed);
        assert_eq!(failed.consecutive_failures, 2);
        assert!(failed.pending);
        assert_eq!(failed.last_error.as_deref(), Some("boom again"));

        handle.started();
        handle.succeeded();
        let ok = handle.get();
        assert_eq!(ok.state, ReloadState::Succeeded);
        assert_eq!(ok.consecutive_failures, 0);
        assert!(!ok.pending);
        assert!(ok.last_error.is_none());
        assert_eq!(ok.total_reloads, 1);
    }

    #[test]
    fn settled_clears_pending_but_keeps_failure() {
        let handle = ReloadStatusHandle::new();
        handle.started();
        handle.failed("boom".into());
        handle.settled();

        let status = handle.get();
        assert!(!status.pending);
        assert_eq!(status.state, ReloadState::Failed);
        assert_eq!(status.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn clones_share_state() {
        let a = ReloadStatusHandle::new();
        let b = a.clone();
        a.started();
        assert_eq!(b.get().state, ReloadState::InProgress);
    }
}
