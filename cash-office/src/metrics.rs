//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `cash_office_closings_saved_total` - Closings saved through the writer
//! - `cash_office_anomalies_total{kind}` - Anomaly warnings raised on save
//! - `cash_office_sign_in_failures_total` - Refused sign-ins
//! - `cash_office_save_duration_seconds` - Histogram of save latencies
//!
//! Each collector owns its registry, so several offices can live in one
//! process.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use reconciliation_core::AnomalyKind;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Closings saved
    pub closings_saved: IntCounter,

    /// Anomalies by kind
    pub anomalies: IntCounterVec,

    /// Refused sign-ins
    pub sign_in_failures: IntCounter,

    /// Save duration histogram
    pub save_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("closings_saved", &self.closings_saved.get())
            .field("sign_in_failures", &self.sign_in_failures.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let closings_saved = IntCounter::new(
            "cash_office_closings_saved_total",
            "Total number of closings saved",
        )?;
        registry.register(Box::new(closings_saved.clone()))?;

        let anomalies = IntCounterVec::new(
            Opts::new(
                "cash_office_anomalies_total",
                "Anomaly warnings raised on save",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(anomalies.clone()))?;

        let sign_in_failures = IntCounter::new(
            "cash_office_sign_in_failures_total",
            "Total number of refused sign-ins",
        )?;
        registry.register(Box::new(sign_in_failures.clone()))?;

        let save_duration = Histogram::with_opts(
            HistogramOpts::new(
                "cash_office_save_duration_seconds",
                "Histogram of closing save latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(save_duration.clone()))?;

        Ok(Self {
            closings_saved,
            anomalies,
            sign_in_failures,
            save_duration,
            registry,
        })
    }

    /// Record a saved closing
    pub fn record_closing_saved(&self, duration_seconds: f64) {
        self.closings_saved.inc();
        self.save_duration.observe(duration_seconds);
    }

    /// Record an anomaly
    pub fn record_anomaly(&self, kind: AnomalyKind) {
        self.anomalies.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record a refused sign-in
    pub fn record_sign_in_failure(&self) {
        self.sign_in_failures.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every collector
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
