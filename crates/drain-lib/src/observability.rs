//! Observability infrastructure for drain runs
//!
//! Provides:
//! - Prometheus metrics (containers drained/skipped, actions by kind, action latency)
//! - Structured JSON logging with tracing

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for action durations (in seconds); sleeps dominate the top end
const ACTION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DrainMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the registry and the actual Prometheus metrics
struct DrainMetricsInner {
    registry: Registry,
    containers_drained: IntCounter,
    containers_skipped: IntCounter,
    actions_emitted: IntCounterVec,
    action_failures: IntCounterVec,
    action_duration_seconds: HistogramVec,
}

impl DrainMetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let containers_drained = IntCounter::new(
            "graceful_drain_containers_drained_total",
            "Number of containers taken through a full drain cycle",
        )
        .expect("Failed to create containers_drained");

        let containers_skipped = IntCounter::new(
            "graceful_drain_containers_skipped_total",
            "Number of discovered containers skipped as unmanaged",
        )
        .expect("Failed to create containers_skipped");

        let actions_emitted = IntCounterVec::new(
            Opts::new(
                "graceful_drain_actions_total",
                "Number of drain actions emitted, by kind",
            ),
            &["kind"],
        )
        .expect("Failed to create actions_emitted");

        let action_failures = IntCounterVec::new(
            Opts::new(
                "graceful_drain_action_failures_total",
                "Number of drain actions that failed, by kind",
            ),
            &["kind"],
        )
        .expect("Failed to create action_failures");

        let action_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "graceful_drain_action_duration_seconds",
                "Wall-clock time spent emitting a drain action, by kind",
            )
            .buckets(ACTION_BUCKETS.to_vec()),
            &["kind"],
        )
        .expect("Failed to create action_duration_seconds");

        registry
            .register(Box::new(containers_drained.clone()))
            .expect("Failed to register containers_drained");
        registry
            .register(Box::new(containers_skipped.clone()))
            .expect("Failed to register containers_skipped");
        registry
            .register(Box::new(actions_emitted.clone()))
            .expect("Failed to register actions_emitted");
        registry
            .register(Box::new(action_failures.clone()))
            .expect("Failed to register action_failures");
        registry
            .register(Box::new(action_duration_seconds.clone()))
            .expect("Failed to register action_duration_seconds");

        Self {
            registry,
            containers_drained,
            containers_skipped,
            actions_emitted,
            action_failures,
            action_duration_seconds,
        }
    }
}

/// Drain metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct DrainMetrics {
    _private: (),
}

impl Default for DrainMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DrainMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DrainMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_containers_drained(&self) {
        self.inner().containers_drained.inc();
    }

    pub fn inc_containers_skipped(&self, count: u64) {
        self.inner().containers_skipped.inc_by(count);
    }

    /// Record a successfully emitted action and how long it took
    pub fn observe_action(&self, kind: &str, duration_secs: f64) {
        self.inner().actions_emitted.with_label_values(&[kind]).inc();
        self.inner()
            .action_duration_seconds
            .with_label_values(&[kind])
            .observe(duration_secs);
    }

    pub fn inc_action_failures(&self, kind: &str) {
        self.inner().action_failures.with_label_values(&[kind]).inc();
    }

    /// Render all registered metrics in the text exposition format
    pub fn render_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.inner().registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Structured logger for drain run events
///
/// Provides consistent JSON-formatted logging for the run lifecycle and
/// per-container outcomes.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Log the start of a run
    pub fn log_run_started(
        &self,
        mode: &str,
        containers: usize,
        skipped: usize,
        seed: Option<u64>,
    ) {
        info!(
            event = "drain_started",
            host = %self.host,
            mode = %mode,
            containers = containers,
            skipped = skipped,
            seed = ?seed,
            "Drain run started"
        );
    }

    /// Log a container left out of the plan
    pub fn log_container_skipped(&self, container_id: &str, reason: &str) {
        warn!(
            event = "container_skipped",
            host = %self.host,
            container_id = %container_id,
            reason = %reason,
            "Container is not managed, skipping"
        );
    }

    /// Log a completed drain cycle
    pub fn log_container_drained(
        &self,
        container_id: &str,
        key: &str,
        killed_at: u64,
        previous_kill: Option<u64>,
    ) {
        info!(
            event = "container_drained",
            host = %self.host,
            container_id = %container_id,
            key = %key,
            killed_at = killed_at,
            previous_kill = ?previous_kill,
            "Container drained"
        );
    }

    /// Log the action that stopped the run
    pub fn log_action_failed(&self, container_id: &str, kind: &str, error: &str) {
        error!(
            event = "action_failed",
            host = %self.host,
            container_id = %container_id,
            kind = %kind,
            error = %error,
            "Drain action failed, aborting remaining plan"
        );
    }

    /// Log the end of a run
    pub fn log_run_finished(&self, drained: usize, actions: usize, virtual_secs: u64) {
        info!(
            event = "drain_finished",
            host = %self.host,
            drained = drained,
            actions = actions,
            virtual_secs = virtual_secs,
            "Drain run finished"
        );
    }

    /// Log operator cancellation
    pub fn log_interrupted(&self, drained: usize) {
        warn!(
            event = "drain_interrupted",
            host = %self.host,
            drained = drained,
            "Drain run interrupted"
        );
    }
}
