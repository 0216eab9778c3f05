use crate::event_log::ReloadEventKind;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::warn;

/// Metrics collector. Every counter is gated behind `enabled`.
///
/// When disabled nothing is registered and every `record_*` call returns
/// immediately. Handshake counters are resolved once at construction so the
/// TLS path never performs a label lookup.
pub struct MetricsCollector {
    enabled: bool,
    registry: Option<Registry>,
    pub reload_events_total: Option<IntCounterVec>,
    pub reload_failures_total: Option<IntCounter>,
    pub store_entries: Option<IntGauge>,
    handshakes_matched: Option<IntCounter>,
    handshakes_default: Option<IntCounter>,
}

impl MetricsCollector {
    /// Create a new collector. When `enabled = false`, everything is None.
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let reload_events_total = IntCounterVec::new(
            Opts::new("reload_events_total", "Reload events by kind").namespace("certsync"),
            &["kind"],
        )?;
        let reload_failures_total = IntCounter::with_opts(
            Opts::new("reload_failures_total", "Failed or timed out reloads").namespace("certsync"),
        )?;
        let store_entries = IntGauge::with_opts(
            Opts::new("store_entries", "Hostnames with a dynamic certificate").namespace("certsync"),
        )?;
        let tls_handshakes_total = IntCounterVec::new(
            Opts::new("tls_handshakes_total", "Certificate lookups by result").namespace("certsync"),
            &["result"],
        )?;

        registry.register(Box::new(reload_events_total.clone()))?;
        registry.register(Box::new(reload_failures_total.clone()))?;
        registry.register(Box::new(store_entries.clone()))?;
        registry.register(Box::new(tls_handshakes_total.clone()))?;

        for kind in ReloadEventKind::ALL {
            reload_events_total.with_label_values(&[kind.as_str()]);
        }

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            reload_events_total: Some(reload_events_total),
            reload_failures_total: Some(reload_failures_total),
            store_entries: Some(store_entries),
            handshakes_matched: Some(tls_handshakes_total.with_label_values(&["matched"])),
            handshakes_default: Some(tls_handshakes_total.with_label_values(&["default"])),
        })
    }

    /// No-op collector.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            reload_events_total: None,
            reload_failures_total: None,
            store_entries: None,
            handshakes_matched: None,
            handshakes_default: None,
        }
    }

    #[inline]
    pub fn record_handshake(&self, matched: bool) {
        if !self.enabled {
            return;
        }
        let counter = if matched {
            &self.handshakes_matched
        } else {
            &self.handshakes_default
        };
        if let Some(c) = counter {
            c.inc();
        }
    }

    pub fn record_reload_event(&self, kind: ReloadEventKind) {
        if let Some(ref counter) = self.reload_events_total {
            counter.with_label_values(&[kind.as_str()]).inc();
        }
    }

    pub fn record_reload_failure(&self) {
        if let Some(ref counter) = self.reload_failures_total {
            counter.inc();
        }
    }

    pub fn set_store_entries(&self, n: usize) {
        if let Some(ref gauge) = self.store_entries {
            gauge.set(n as i64);
        }
    }

    /// Prometheus text exposition of every registered family; empty when
    /// disabled.
    pub fn render(&self) -> String {
        let Some(ref registry) = self.registry else {
            return String::new();
        };
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
