//! Vendor-neutral telemetry interface: an event log / span / counter /
//! distribution / exception capture surface with a process-wide
//! configurable backend, so `sync-engine` never hard-codes a vendor.
//!
//! The default backend logs through `tracing` off the hot path — callers
//! pay the cost of formatting only when a subscriber is actually listening
//! at that level.

use std::sync::{Arc, OnceLock, RwLock};

use serde_json::Value;

/// A single structured telemetry sink. Implementations must be cheap to
/// clone (wrap an `Arc` internally if state is needed) since `active()`
/// hands out a fresh `Arc` on every call.
pub trait Telemetry: Send + Sync {
    /// Record a discrete named event with structured attributes.
    fn event(&self, name: &str, attrs: &Value);

    /// Record a span's completion with its duration in milliseconds.
    fn span(&self, name: &str, duration_ms: u64, attrs: &Value);

    /// Increment a named counter by `delta`.
    fn counter(&self, name: &str, delta: u64, attrs: &Value);

    /// Record one sample of a named distribution (histogram-like metric).
    fn distribution(&self, name: &str, value: f64, attrs: &Value);

    /// Capture an infrastructural exception that aborted a request (spec
    /// §7): `context` carries at minimum `{event, method, path}` for a
    /// route-layer failure, but any caller-defined shape is accepted.
    fn exception(&self, error: &(dyn std::error::Error + 'static), context: &Value);
}

/// Default backend: every call becomes one `tracing` event at an
/// appropriate level. Writes are deferred to whatever subscriber the
/// process installed (see [`init_tracing_subscriber`]) — this struct itself
/// does no I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn event(&self, name: &str, attrs: &Value) {
        tracing::info!(target: "sync.telemetry", event = name, attrs = %attrs, "event");
    }

    fn span(&self, name: &str, duration_ms: u64, attrs: &Value) {
        tracing::info!(target: "sync.telemetry", span = name, duration_ms, attrs = %attrs, "span");
    }

    fn counter(&self, name: &str, delta: u64, attrs: &Value) {
        tracing::info!(target: "sync.telemetry", counter = name, delta, attrs = %attrs, "counter");
    }

    fn distribution(&self, name: &str, value: f64, attrs: &Value) {
        tracing::info!(target: "sync.telemetry", distribution = name, value, attrs = %attrs, "distribution");
    }

    fn exception(&self, error: &(dyn std::error::Error + 'static), context: &Value) {
        tracing::error!(target: "sync.telemetry", error = %error, context = %context, "exception");
    }
}

fn backend_slot() -> &'static RwLock<Arc<dyn Telemetry>> {
    static BACKEND: OnceLock<RwLock<Arc<dyn Telemetry>>> = OnceLock::new();
    BACKEND.get_or_init(|| RwLock::new(Arc::new(TracingTelemetry)))
}

/// Install a new process-wide telemetry backend, replacing any previous one.
pub fn configure(backend: Arc<dyn Telemetry>) {
    let mut slot = backend_slot().write().expect("telemetry backend lock poisoned");
    *slot = backend;
}

/// The currently active telemetry backend.
pub fn active() -> Arc<dyn Telemetry> {
    Arc::clone(&backend_slot().read().expect("telemetry backend lock poisoned"))
}

/// Reset the process-wide backend back to the default [`TracingTelemetry`].
/// Exposed mainly for test isolation between cases that call [`configure`].
pub fn reset() {
    configure(Arc::new(TracingTelemetry));
}

/// One-shot `tracing_subscriber` setup for binaries: honors `RUST_LOG`,
/// defaults to `info`.
pub fn init_tracing_subscriber() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Context shape for the infrastructural-failure hook spec §7 specifies
/// verbatim: `{event: "sync.route.unhandled", method, path}`.
pub fn route_unhandled_context(method: &str, path: &str) -> Value {
    serde_json::json!({
        "event": "sync.route.unhandled",
        "method": method,
        "path": path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTelemetry {
        events: AtomicUsize,
    }

    impl Telemetry for CountingTelemetry {
        fn event(&self, _name: &str, _attrs: &Value) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
        fn span(&self, _name: &str, _duration_ms: u64, _attrs: &Value) {}
        fn counter(&self, _name: &str, _delta: u64, _attrs: &Value) {}
        fn distribution(&self, _name: &str, _value: f64, _attrs: &Value) {}
        fn exception(&self, _error: &(dyn std::error::Error + 'static), _context: &Value) {}
    }

    #[test]
    fn configure_swaps_the_active_backend_and_reset_restores_default_and_context_matches_wire_contract() {
        // Both assertions share process-global telemetry state, so they run
        // as one test to avoid racing against a parallel test thread.
        let counting = Arc::new(CountingTelemetry::default());
        configure(counting.clone());
        active().event("test.event", &Value::Null);
        assert_eq!(counting.events.load(Ordering::SeqCst), 1);

        reset();
        // After reset, active() no longer points at our counting backend.
        active().event("test.event", &Value::Null);
        assert_eq!(counting.events.load(Ordering::SeqCst), 1);

        let ctx = route_unhandled_context("POST", "/v1/sync");
        assert_eq!(ctx["event"], "sync.route.unhandled");
        assert_eq!(ctx["method"], "POST");
        assert_eq!(ctx["path"], "/v1/sync");
    }
}
