use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// The only three things the reload path ever reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadEventKind {
    ReloadRequired,
    ReloadSucceeded,
    ReloadSkipped,
}

impl ReloadEventKind {
    pub const ALL: [ReloadEventKind; 3] = [
        ReloadEventKind::ReloadRequired,
        ReloadEventKind::ReloadSucceeded,
        ReloadEventKind::ReloadSkipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadEventKind::ReloadRequired => "reload_required",
            ReloadEventKind::ReloadSucceeded => "reload_succeeded",
            ReloadEventKind::ReloadSkipped => "reload_skipped",
        }
    }

    /// Fixed log line, stable so external tooling can grep for it.
    pub fn message(&self) -> &'static str {
        match self {
            ReloadEventKind::ReloadRequired => {
                "Configuration changes detected, backend reload required"
            }
            ReloadEventKind::ReloadSucceeded => "Backend successfully reloaded",
            ReloadEventKind::ReloadSkipped => {
                "Changes handled by the dynamic configuration, skipping backend reload"
            }
        }
    }
}

impl fmt::Display for ReloadEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadEvent {
    /// Emission order, starting at 1.
    pub seq: u64,
    pub kind: ReloadEventKind,
    pub at: DateTime<Utc>,
    pub hosts: Vec<String>,
}

struct Inner {
    next_seq: u64,
    entries: VecDeque<ReloadEvent>,
}

/// Append-only log of reload events.
///
/// Every event is written as one `tracing` line and kept in a bounded
/// in-memory history for the admin API and for assertions in tests.
pub struct EventLog {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_seq: 1,
                entries: VecDeque::with_capacity(capacity.min(1024)),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record an event and write its log line.
    pub fn emit<I, S>(&self, kind: ReloadEventKind, hosts: I) -> ReloadEvent
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hosts: Vec<String> = hosts.into_iter().map(Into::into).collect();
        let mut inner = self.lock();
        let event = ReloadEvent {
            seq: inner.next_seq,
            kind,
            at: Utc::now(),
            hosts,
        };
        inner.next_seq += 1;

        info!(
            event = kind.as_str(),
            seq = event.seq,
            hosts = %event.hosts.join(","),
            "{}",
            kind.message()
        );

        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(event.clone());
        event
    }

    /// All retained events, oldest first.
    pub fn events(&self) -> Vec<ReloadEvent> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Retained events with `seq > after`.
    pub fn events_since(&self, after: u64) -> Vec<ReloadEvent> {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.seq > after)
            .cloned()
            .collect()
    }

    /// Kinds of retained events with `seq > after`, in order.
    pub fn kinds_since(&self, after: u64) -> Vec<ReloadEventKind> {
        self.events_since(after).into_iter().map(|e| e.kind).collect()
    }

    /// Sequence number of the most recent event (0 when empty).
    pub fn last_seq(&self) -> u64 {
        self.lock().next_seq - 1
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1024)
    }
}
