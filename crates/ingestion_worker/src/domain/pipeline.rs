use crate::domain::{
    Admission, DeviceActivityTracker, HandlerOutcome, IngestionStats, MessageRouter,
    SequenceDeduplicator, parse_envelope,
};
use crate::mqtt::parse_topic;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{Span, debug, info, warn};

/// What became of one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageDisposition {
    Handled(HandlerOutcome),
    Duplicate,
    DecodeError,
    InvalidTopic,
}

/// The ingestion pipeline: topic parsing, decoding, last-seen tracking,
/// deduplication, routing.
///
/// Owns the sequence watermarks. Messages are expected one at a time; the
/// activity tracker and stats may be read concurrently.
pub struct IngestionPipeline {
    deduplicator: SequenceDeduplicator,
    activity: Arc<DeviceActivityTracker>,
    router: MessageRouter,
    stats: Arc<IngestionStats>,
}

impl IngestionPipeline {
    pub fn new(
        router: MessageRouter,
        activity: Arc<DeviceActivityTracker>,
        stats: Arc<IngestionStats>,
    ) -> Self {
        Self {
            deduplicator: SequenceDeduplicator::new(),
            activity,
            router,
            stats,
        }
    }

    pub fn activity(&self) -> &Arc<DeviceActivityTracker> {
        &self.activity
    }

    pub fn stats(&self) -> &Arc<IngestionStats> {
        &self.stats
    }

    pub async fn watermark(&self, device_id: &str) -> Option<i64> {
        self.deduplicator.watermark(device_id).await
    }

    /// Run one message through the pipeline
    ///
    /// The watermark advances before any sink is called and is never rolled
    /// back by a sink failure.
    pub async fn process(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> MessageDisposition {
        self.stats.record_received();

        let parsed_topic = match parse_topic(topic) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "dropping message with invalid topic");
                self.stats.record_invalid_topic();
                return MessageDisposition::InvalidTopic;
            }
        };
        Span::current().record("device_id", parsed_topic.device_id.as_str());

        let envelope = match parse_envelope(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping undecodable message");
                self.stats.record_decode_error();
                return MessageDisposition::DecodeError;
            }
        };

        let message = envelope.normalize(&parsed_topic, received_at);
        self.activity.touch(&message.device_id, received_at).await;

        match self
            .deduplicator
            .admit(&message.device_id, message.sequence)
            .await
        {
            Admission::Duplicate { watermark } => {
                debug!(
                    seq = ?message.sequence,
                    watermark,
                    "dropping duplicate or out-of-order message"
                );
                self.stats.record_duplicate();
                return MessageDisposition::Duplicate;
            }
            Admission::Accept { gap: Some(missing) } => {
                warn!(
                    seq = ?message.sequence,
                    missing,
                    "sequence gap detected"
                );
                self.stats.record_gap(missing);
            }
            Admission::Accept { gap: None } => {}
        }

        let outcome = self.router.route(&message).await;
        self.record_outcome(&outcome);

        info!(
            category = %message.category(),
            archived = outcome.archived,
            points = outcome.points_written,
            "message handled"
        );
        MessageDisposition::Handled(outcome)
    }

    fn record_outcome(&self, outcome: &HandlerOutcome) {
        self.stats.record_handled();
        self.stats.record_points_written(outcome.points_written);
        if outcome.archive_failed {
            self.stats.record_archive_failure();
        }
        if outcome.points_failed > 0 {
            self.stats.record_timeseries_failures(outcome.points_failed);
        }
        if outcome.event_failed {
            self.stats.record_event_failure();
        }
    }
}
