use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use serde::Serialize;

/// Ingestion counters, shared between the pipeline and the health surface
///
/// Counters live in a registry owned by this struct, exported in Prometheus text
/// format on `/metrics` and as a flat JSON snapshot on `/stats`.
pub struct IngestionStats {
    registry: Registry,
    received: IntCounter,
    decode_errors: IntCounter,
    invalid_topics: IntCounter,
    duplicates: IntCounter,
    gaps_detected: IntCounter,
    sequences_missed: IntCounter,
    messages_handled: IntCounter,
    points_written: IntCounter,
    archive_failures: IntCounter,
    timeseries_failures: IntCounter,
    event_failures: IntCounter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub decode_errors: u64,
    pub invalid_topics: u64,
    pub duplicates: u64,
    pub gaps_detected: u64,
    pub sequences_missed: u64,
    pub messages_handled: u64,
    pub points_written: u64,
    pub archive_failures: u64,
    pub timeseries_failures: u64,
    pub event_failures: u64,
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl IngestionStats {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("collector".to_string()), None)?;
        let counter = |name: &str, help: &str| register_counter(&registry, name, help);

        Ok(Self {
            received: counter("messages_received_total", "Messages received from the broker")?,
            decode_errors: counter("decode_errors_total", "Messages dropped as undecodable")?,
            invalid_topics: counter("invalid_topics_total", "Messages dropped for a malformed topic")?,
            duplicates: counter("duplicates_total", "Duplicate or out-of-order messages dropped")?,
            gaps_detected: counter("sequence_gaps_total", "Forward sequence jumps detected")?,
            sequences_missed: counter("sequences_missed_total", "Sequence numbers skipped by gaps")?,
            messages_handled: counter("messages_handled_total", "Messages routed to a handler")?,
            points_written: counter("points_written_total", "Time-series points written")?,
            archive_failures: counter("archive_failures_total", "Failed archive puts")?,
            timeseries_failures: counter("timeseries_failures_total", "Failed time-series writes")?,
            event_failures: counter("event_failures_total", "Failed device event publishes")?,
            registry,
        })
    }

    pub fn record_received(&self) {
        self.received.inc();
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.inc();
    }

    pub fn record_invalid_topic(&self) {
        self.invalid_topics.inc();
    }

    pub fn record_duplicate(&self) {
        self.duplicates.inc();
    }

    pub fn record_gap(&self, missing: u64) {
        self.gaps_detected.inc();
        self.sequences_missed.inc_by(missing);
    }

    pub fn record_handled(&self) {
        self.messages_handled.inc();
    }

    pub fn record_points_written(&self, points: u64) {
        self.points_written.inc_by(points);
    }

    pub fn record_archive_failure(&self) {
        self.archive_failures.inc();
    }

    pub fn record_timeseries_failures(&self, failures: u64) {
        self.timeseries_failures.inc_by(failures);
    }

    pub fn record_event_failure(&self) {
        self.event_failures.inc();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.get(),
            decode_errors: self.decode_errors.get(),
            invalid_topics: self.invalid_topics.get(),
            duplicates: self.duplicates.get(),
            gaps_detected: self.gaps_detected.get(),
            sequences_missed: self.sequences_missed.get(),
            messages_handled: self.messages_handled.get(),
            points_written: self.points_written.get(),
            archive_failures: self.archive_failures.get(),
            timeseries_failures: self.timeseries_failures.get(),
            event_failures: self.event_failures.get(),
        }
    }

    /// Render every counter in the Prometheus text exposition format
    pub fn encode(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
