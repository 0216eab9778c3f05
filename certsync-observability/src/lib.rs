pub mod event_log;

#[cfg(feature = "prometheus")]
pub mod metrics;

pub use event_log::{EventLog, ReloadEvent, ReloadEventKind};

#[cfg(feature = "prometheus")]
pub use metrics::MetricsCollector;
