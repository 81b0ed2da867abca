//! Job metrics with Prometheus
//!
//! Counters for every stage of a run:
//! - Lines read and parse failures by kind (map side)
//! - Records emitted and geolocation misses by reason (reduce side)
//! - Partition attempts by outcome and per-attempt duration

use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector for one job run
#[derive(Clone)]
pub struct JobMetrics {
    registry: Arc<Registry>,

    /// Raw input lines read (blank lines included)
    pub lines_read: Counter,
    /// Lines rejected before the shuffle
    pub parse_errors: CounterVec,
    /// Output records in committed partitions
    pub records_emitted: Counter,
    /// Records emitted with the unknown address sentinel
    pub lookup_misses: CounterVec,
    /// Sessions in committed partitions
    pub sessions_total: Counter,
    /// Partition attempts by outcome (committed, failed, cancelled)
    pub partition_attempts: CounterVec,
    /// Wall time of one partition attempt
    pub partition_duration_seconds: Histogram,
}

impl JobMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let lines_read = Counter::with_opts(Opts::new(
            "sessionpath_lines_read_total",
            "Total number of raw input lines read",
        ))?;

        let parse_errors = CounterVec::new(
            Opts::new(
                "sessionpath_parse_errors_total",
                "Total number of input lines rejected by the parser",
            ),
            &["kind"],
        )?;

        let records_emitted = Counter::with_opts(Opts::new(
            "sessionpath_records_emitted_total",
            "Total number of enriched records emitted",
        ))?;

        let lookup_misses = CounterVec::new(
            Opts::new(
                "sessionpath_lookup_misses_total",
                "Total number of records whose IP could not be resolved",
            ),
            &["reason"],
        )?;

        let sessions_total = Counter::with_opts(Opts::new(
            "sessionpath_sessions_total",
            "Total number of sessions processed",
        ))?;

        let partition_attempts = CounterVec::new(
            Opts::new(
                "sessionpath_partition_attempts_total",
                "Total number of partition attempts",
            ),
            &["outcome"],
        )?;

        let partition_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "sessionpath_partition_duration_seconds",
                "Duration of one partition attempt in seconds",
            )
            .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        )?;

        registry.register(Box::new(lines_read.clone()))?;
        registry.register(Box::new(parse_errors.clone()))?;
        registry.register(Box::new(records_emitted.clone()))?;
        registry.register(Box::new(lookup_misses.clone()))?;
        registry.register(Box::new(sessions_total.clone()))?;
        registry.register(Box::new(partition_attempts.clone()))?;
        registry.register(Box::new(partition_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            lines_read,
            parse_errors,
            records_emitted,
            lookup_misses,
            sessions_total,
            partition_attempts,
            partition_duration_seconds,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_line(&self) {
        self.lines_read.inc();
    }

    pub fn record_parse_error(&self, kind: &str) {
        self.parse_errors.with_label_values(&[kind]).inc();
    }

    pub fn record_emitted(&self, count: u64) {
        self.records_emitted.inc_by(count as f64);
    }

    pub fn record_lookup_misses(&self, reason: &str, count: u64) {
        self.lookup_misses
            .with_label_values(&[reason])
            .inc_by(count as f64);
    }

    pub fn record_sessions(&self, count: u64) {
        self.sessions_total.inc_by(count as f64);
    }

    pub fn record_partition_attempt(&self, outcome: AttemptOutcome, duration_secs: f64) {
        self.partition_attempts
            .with_label_values(&[outcome.as_str()])
            .inc();
        self.partition_duration_seconds.observe(duration_secs);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

/// Outcome of one partition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Committed,
    Failed,
    Cancelled,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}
