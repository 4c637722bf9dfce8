use crate::domain::{DeviceActivityTracker, HandlerOutcome, MessageHandler};
use async_trait::async_trait;
use common::domain::{
    ArchiveRecord, ArchiveSink, DeviceEvent, DeviceEventPublisher, InboundMessage,
    MessagePayload, TelemetryPayload, TelemetryPoint, TimeSeriesSink,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Store the message body in the archive under its category
async fn archive_message(archive: &dyn ArchiveSink, message: &InboundMessage) -> bool {
    let record = ArchiveRecord {
        device_id: message.device_id.clone(),
        timestamp: message.received_at,
        category: message.category(),
        data: message.raw.clone(),
    };
    let key = record.key();

    let body = match serde_json::to_vec(&record) {
        Ok(body) => body,
        Err(e) => {
            error!(key = %key, error = %e, "failed to serialize archive record");
            return false;
        }
    };

    match archive.put(&key, body.into()).await {
        Ok(()) => {
            debug!(key = %key, "archived message");
            true
        }
        Err(e) => {
            error!(key = %key, error = %e, "failed to archive message");
            false
        }
    }
}

async fn publish_event(events: &dyn DeviceEventPublisher, event: Option<DeviceEvent>) -> Option<bool> {
    let event = event?;
    match events.publish(&event).await {
        Ok(()) => Some(true),
        Err(e) => {
            warn!(kind = %event.category(), error = %e, "failed to publish device event");
            Some(false)
        }
    }
}

/// Archive and publish concurrently; neither waits on the other's outcome
async fn archive_and_publish(
    archive: &dyn ArchiveSink,
    events: &dyn DeviceEventPublisher,
    message: &InboundMessage,
    event: Option<DeviceEvent>,
) -> HandlerOutcome {
    let (archived, published) = tokio::join!(
        archive_message(archive, message),
        publish_event(events, event)
    );

    HandlerOutcome {
        archived,
        archive_failed: !archived,
        event_published: published == Some(true),
        event_failed: published == Some(false),
        ..Default::default()
    }
}

fn unexpected_payload(message: &InboundMessage, expected: &str) {
    warn!(
        category = %message.category(),
        expected = %expected,
        "handler received a payload of another category, archiving only"
    );
}

/// Points for a telemetry message
///
/// A measurement list yields one point per measurement, tagged with its unit and
/// stamped with its own time when present. Otherwise each numeric field yields one
/// point without a unit.
pub fn telemetry_points(message: &InboundMessage, measurement: &str) -> Vec<TelemetryPoint> {
    let MessagePayload::Telemetry(payload) = &message.payload else {
        return Vec::new();
    };

    match payload {
        TelemetryPayload::Measurements(items) => items
            .iter()
            .map(|m| TelemetryPoint {
                measurement: measurement.to_string(),
                device_id: message.device_id.clone(),
                metric: m.kind.clone(),
                unit: m.unit.clone(),
                value: m.value,
                timestamp: m.timestamp.unwrap_or(message.timestamp),
            })
            .collect(),
        TelemetryPayload::Fields(fields) => fields
            .iter()
            .map(|f| TelemetryPoint {
                measurement: measurement.to_string(),
                device_id: message.device_id.clone(),
                metric: f.name.clone(),
                unit: None,
                value: f.value,
                timestamp: message.timestamp,
            })
            .collect(),
    }
}

pub struct TelemetryHandler {
    archive: Arc<dyn ArchiveSink>,
    timeseries: Arc<dyn TimeSeriesSink>,
    measurement: String,
}

impl TelemetryHandler {
    pub fn new(
        archive: Arc<dyn ArchiveSink>,
        timeseries: Arc<dyn TimeSeriesSink>,
        measurement: impl Into<String>,
    ) -> Self {
        Self {
            archive,
            timeseries,
            measurement: measurement.into(),
        }
    }

    async fn write_points(&self, points: Vec<TelemetryPoint>) -> (u64, u64) {
        let mut written = 0;
        let mut failed = 0;
        let mut last_error = None;

        for point in &points {
            match self.timeseries.write(point).await {
                Ok(()) => written += 1,
                Err(e) => {
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            error!(
                written,
                failed,
                error = %e,
                "failed to write telemetry points"
            );
        }

        (written, failed)
    }
}

#[async_trait]
impl MessageHandler for TelemetryHandler {
    async fn handle(&self, message: &InboundMessage) -> HandlerOutcome {
        let points = telemetry_points(message, &self.measurement);
        if points.is_empty() {
            debug!("telemetry message carried no numeric readings");
        }

        let (archived, (points_written, points_failed)) = tokio::join!(
            archive_message(self.archive.as_ref(), message),
            self.write_points(points)
        );

        HandlerOutcome {
            archived,
            archive_failed: !archived,
            points_written,
            points_failed,
            ..Default::default()
        }
    }
}

/// Heartbeats: archived and forwarded to the registry, never written as points
pub struct HelloHandler {
    archive: Arc<dyn ArchiveSink>,
    events: Arc<dyn DeviceEventPublisher>,
}

impl HelloHandler {
    pub fn new(archive: Arc<dyn ArchiveSink>, events: Arc<dyn DeviceEventPublisher>) -> Self {
        Self { archive, events }
    }
}

#[async_trait]
impl MessageHandler for HelloHandler {
    async fn handle(&self, message: &InboundMessage) -> HandlerOutcome {
        let event = match &message.payload {
            MessagePayload::Hello(hello) => {
                debug!(
                    fw_version = ?hello.fw_version,
                    uptime_s = ?hello.uptime_s,
                    broker_connections = ?hello.broker_connections,
                    buf_usage_pct = ?hello.buf_usage_pct,
                    "device hello"
                );
                Some(DeviceEvent::Hello {
                    device_id: message.device_id.clone(),
                    timestamp: message.timestamp,
                    fw_version: hello.fw_version.clone(),
                    uptime_s: hello.uptime_s,
                })
            }
            _ => {
                unexpected_payload(message, "hello");
                None
            }
        };

        archive_and_publish(self.archive.as_ref(), self.events.as_ref(), message, event).await
    }
}

/// Online/offline reports, including the broker's last-will message
pub struct StatusHandler {
    archive: Arc<dyn ArchiveSink>,
    events: Arc<dyn DeviceEventPublisher>,
    activity: Arc<DeviceActivityTracker>,
}

impl StatusHandler {
    pub fn new(
        archive: Arc<dyn ArchiveSink>,
        events: Arc<dyn DeviceEventPublisher>,
        activity: Arc<DeviceActivityTracker>,
    ) -> Self {
        Self {
            archive,
            events,
            activity,
        }
    }
}

#[async_trait]
impl MessageHandler for StatusHandler {
    async fn handle(&self, message: &InboundMessage) -> HandlerOutcome {
        let event = match &message.payload {
            MessagePayload::Status(status) => {
                self.activity
                    .record_status(&message.device_id, status.status.clone())
                    .await;
                Some(DeviceEvent::Status {
                    device_id: message.device_id.clone(),
                    timestamp: message.timestamp,
                    status: status.status.clone(),
                })
            }
            _ => {
                unexpected_payload(message, "status");
                None
            }
        };

        archive_and_publish(self.archive.as_ref(), self.events.as_ref(), message, event).await
    }
}

pub struct CommandAckHandler {
    archive: Arc<dyn ArchiveSink>,
    events: Arc<dyn DeviceEventPublisher>,
}

impl CommandAckHandler {
    pub fn new(archive: Arc<dyn ArchiveSink>, events: Arc<dyn DeviceEventPublisher>) -> Self {
        Self { archive, events }
    }
}

#[async_trait]
impl MessageHandler for CommandAckHandler {
    async fn handle(&self, message: &InboundMessage) -> HandlerOutcome {
        let event = match &message.payload {
            MessagePayload::CommandAck(ack) => Some(DeviceEvent::CommandAck {
                device_id: message.device_id.clone(),
                timestamp: message.timestamp,
                cmd_id: ack.cmd_id.clone(),
                result: ack.result.clone(),
                detail: ack.detail.clone(),
            }),
            _ => {
                unexpected_payload(message, "command_ack");
                None
            }
        };

        archive_and_publish(self.archive.as_ref(), self.events.as_ref(), message, event).await
    }
}

pub struct OtaStatusHandler {
    archive: Arc<dyn ArchiveSink>,
    events: Arc<dyn DeviceEventPublisher>,
}

impl OtaStatusHandler {
    pub fn new(archive: Arc<dyn ArchiveSink>, events: Arc<dyn DeviceEventPublisher>) -> Self {
        Self { archive, events }
    }
}

#[async_trait]
impl MessageHandler for OtaStatusHandler {
    async fn handle(&self, message: &InboundMessage) -> HandlerOutcome {
        let event = match &message.payload {
            MessagePayload::OtaStatus(ota) => Some(DeviceEvent::OtaStatus {
                device_id: message.device_id.clone(),
                timestamp: message.timestamp,
                cmd_id: ota.cmd_id.clone(),
                ota_state: ota.state.as_ref().map(|s| s.as_str().to_string()),
                progress_pct: ota.progress_pct,
            }),
            _ => {
                unexpected_payload(message, "ota_status");
                None
            }
        };

        archive_and_publish(self.archive.as_ref(), self.events.as_ref(), message, event).await
    }
}
