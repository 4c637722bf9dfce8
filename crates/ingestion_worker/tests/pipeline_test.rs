#![cfg(feature = "integration-tests")]

use chrono::Utc;
use ingestion_worker::domain::{
    CommandAckHandler, DeviceActivityTracker, HelloHandler, IngestionPipeline, IngestionStats,
    MessageDisposition, MessageRouter, OtaStatusHandler, StatusHandler, TelemetryHandler,
};
use serde_json::json;
use std::sync::Arc;

// In-memory sinks recording every call
mod recording {
    use async_trait::async_trait;
    use common::domain::{
        ArchiveObject, ArchiveSink, DeviceEvent, DeviceEventPublisher, DomainError, DomainResult,
        RangeQuery, TelemetryPoint, TimeSeriesSink, matches_listing,
    };
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub struct RecordingArchive {
        pub objects: Mutex<Vec<(String, bytes::Bytes)>>,
    }

    impl RecordingArchive {
        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
        }
    }

    #[async_trait]
    impl ArchiveSink for RecordingArchive {
        async fn put(&self, key: &str, body: bytes::Bytes) -> DomainResult<()> {
            self.objects.lock().unwrap().push((key.to_string(), body));
            Ok(())
        }

        async fn list(&self, prefix: &str, recursive: bool) -> DomainResult<Vec<ArchiveObject>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|(key, _)| matches_listing(key, prefix, recursive))
                .map(|(key, body)| ArchiveObject {
                    key: key.clone(),
                    size: body.len() as u64,
                    last_modified: None,
                })
                .collect())
        }
    }

    #[derive(Default)]
    pub struct RecordingTimeSeries {
        pub points: Mutex<Vec<TelemetryPoint>>,
        pub failing: AtomicBool,
    }

    impl RecordingTimeSeries {
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn points(&self) -> Vec<TelemetryPoint> {
            self.points.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TimeSeriesSink for RecordingTimeSeries {
        async fn write(&self, point: &TelemetryPoint) -> DomainResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DomainError::SinkUnavailable("timeseries down".to_string()));
            }
            self.points.lock().unwrap().push(point.clone());
            Ok(())
        }

        async fn query_range(&self, query: &RangeQuery) -> DomainResult<Vec<TelemetryPoint>> {
            let mut points: Vec<_> = self
                .points
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.device_id == query.device_id)
                .filter(|p| query.metric.as_ref().is_none_or(|m| &p.metric == m))
                .filter(|p| p.timestamp >= query.start && p.timestamp < query.end)
                .cloned()
                .collect();
            points.sort_by_key(|p| p.timestamp);
            Ok(points)
        }

        async fn commit(&self) -> DomainResult<()> {
            Ok(())
        }

        async fn flush(&self) -> DomainResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingEvents {
        pub events: Mutex<Vec<DeviceEvent>>,
    }

    #[async_trait]
    impl DeviceEventPublisher for RecordingEvents {
        async fn publish(&self, event: &DeviceEvent) -> DomainResult<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}

use recording::{RecordingArchive, RecordingEvents, RecordingTimeSeries};

struct Harness {
    pipeline: IngestionPipeline,
    archive: Arc<RecordingArchive>,
    timeseries: Arc<RecordingTimeSeries>,
    events: Arc<RecordingEvents>,
}

fn harness() -> Harness {
    let archive = Arc::new(RecordingArchive::default());
    let timeseries = Arc::new(RecordingTimeSeries::default());
    let events = Arc::new(RecordingEvents::default());
    let activity = Arc::new(DeviceActivityTracker::new());

    let router = MessageRouter::new(
        Arc::new(TelemetryHandler::new(
            archive.clone(),
            timeseries.clone(),
            "iot_telemetry",
        )),
        Arc::new(HelloHandler::new(archive.clone(), events.clone())),
        Arc::new(StatusHandler::new(archive.clone(), events.clone(), activity.clone())),
        Arc::new(CommandAckHandler::new(archive.clone(), events.clone())),
        Arc::new(OtaStatusHandler::new(archive.clone(), events.clone())),
    );

    Harness {
        pipeline: IngestionPipeline::new(router, activity, Arc::new(IngestionStats::new().unwrap())),
        archive,
        timeseries,
        events,
    }
}

fn versioned_telemetry(seq: i64) -> Vec<u8> {
    json!({
        "v": 2,
        "device_id": "dc-meter-007",
        "ts": "2026-02-12T10:00:01Z",
        "seq": seq,
        "msg_type": "telemetry",
        "measurements": [
            {"type": "voltage_dc", "val": 756.3, "unit": "V"},
            {"type": "current_dc", "val": 312.8, "unit": "A"}
        ]
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_versioned_telemetry_written_and_archived() {
    let h = harness();

    let disposition = h
        .pipeline
        .process("iot/dc-meter-007/telemetry", &versioned_telemetry(42), Utc::now())
        .await;

    assert!(matches!(disposition, MessageDisposition::Handled(_)));
    let points = h.timeseries.points();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].measurement, "iot_telemetry");
    assert_eq!(points[0].metric, "voltage_dc");
    assert_eq!(points[0].unit.as_deref(), Some("V"));
    assert_eq!(points[1].metric, "current_dc");

    let keys = h.archive.keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("dc-meter-007/telemetry/"));
    assert!(keys[0].ends_with(".json"));
    assert_eq!(h.pipeline.watermark("dc-meter-007").await, Some(42));
}

#[tokio::test]
async fn test_legacy_record_numeric_fields_become_points() {
    let h = harness();
    let payload = json!({
        "timestamp": "2026-02-12T10:00:01",
        "temperature": 23.5,
        "humidity": 45,
        "unit": "C"
    });

    h.pipeline
        .process("iot/legacy-1/telemetry", payload.to_string().as_bytes(), Utc::now())
        .await;

    let mut metrics: Vec<_> = h.timeseries.points().into_iter().map(|p| p.metric).collect();
    metrics.sort();
    assert_eq!(metrics, vec!["humidity", "temperature"]);
    assert!(h.timeseries.points().iter().all(|p| p.unit.is_none()));
    assert_eq!(h.archive.keys().len(), 1);
    assert_eq!(h.pipeline.watermark("legacy-1").await, None);
}

#[tokio::test]
async fn test_redelivered_message_stored_once() {
    let h = harness();
    let payload = versioned_telemetry(7);

    h.pipeline.process("iot/dc-meter-007/telemetry", &payload, Utc::now()).await;
    let again = h
        .pipeline
        .process("iot/dc-meter-007/telemetry", &payload, Utc::now())
        .await;

    assert_eq!(again, MessageDisposition::Duplicate);
    assert_eq!(h.archive.keys().len(), 1);
    assert_eq!(h.timeseries.points().len(), 2);
    assert_eq!(h.pipeline.stats().snapshot().duplicates, 1);
}

#[tokio::test]
async fn test_gap_is_reported_but_not_blocking() {
    let h = harness();

    h.pipeline.process("iot/dc-meter-007/telemetry", &versioned_telemetry(1), Utc::now()).await;
    let after_gap = h
        .pipeline
        .process("iot/dc-meter-007/telemetry", &versioned_telemetry(5), Utc::now())
        .await;

    assert!(matches!(after_gap, MessageDisposition::Handled(_)));
    assert_eq!(h.timeseries.points().len(), 4);
    let stats = h.pipeline.stats().snapshot();
    assert_eq!(stats.gaps_detected, 1);
    assert_eq!(stats.sequences_missed, 3);
}

#[tokio::test]
async fn test_each_topic_reaches_its_handler() {
    let h = harness();
    let now = Utc::now();

    h.pipeline
        .process("iot/m1/hello", json!({"v": 2, "seq": 1, "fw_version": "1.4.0"}).to_string().as_bytes(), now)
        .await;
    h.pipeline
        .process("iot/m1/status", json!({"v": 2, "seq": 2, "status": "online"}).to_string().as_bytes(), now)
        .await;
    h.pipeline
        .process(
            "iot/m1/command/ack",
            json!({"v": 2, "seq": 3, "cmd_id": "c-1", "result": "accepted"}).to_string().as_bytes(),
            now,
        )
        .await;
    h.pipeline
        .process(
            "iot/m1/ota/status",
            json!({"v": 2, "seq": 4, "cmd_id": "c-2", "ota_state": "verifying", "progress_pct": 90})
                .to_string()
                .as_bytes(),
            now,
        )
        .await;

    let kinds: Vec<_> = h
        .events
        .events
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.category().as_str())
        .collect();
    assert_eq!(kinds, vec!["hello", "status", "command_ack", "ota_status"]);
    assert_eq!(h.archive.keys().len(), 4);
    assert!(h.timeseries.points().is_empty());
}

#[tokio::test]
async fn test_unknown_suffix_treated_as_telemetry() {
    let h = harness();

    h.pipeline
        .process("iot/m1/foobar", json!({"temperature": 20.0}).to_string().as_bytes(), Utc::now())
        .await;

    assert_eq!(h.timeseries.points().len(), 1);
    assert!(h.archive.keys()[0].starts_with("m1/telemetry/"));
}

#[tokio::test]
async fn test_sink_failure_does_not_roll_back_watermark() {
    let h = harness();
    h.timeseries.set_failing(true);

    let first = h
        .pipeline
        .process("iot/dc-meter-007/telemetry", &versioned_telemetry(9), Utc::now())
        .await;
    h.timeseries.set_failing(false);
    let retry = h
        .pipeline
        .process("iot/dc-meter-007/telemetry", &versioned_telemetry(9), Utc::now())
        .await;

    match first {
        MessageDisposition::Handled(outcome) => {
            assert_eq!(outcome.points_failed, 2);
            assert!(outcome.archived);
        }
        other => panic!("expected handled, got {:?}", other),
    }
    assert_eq!(retry, MessageDisposition::Duplicate);
    assert!(h.timeseries.points().is_empty());
    assert_eq!(h.pipeline.stats().snapshot().timeseries_failures, 2);
}

#[tokio::test]
async fn test_archive_listing_by_device_prefix() {
    use common::domain::ArchiveSink;
    let h = harness();

    h.pipeline.process("iot/m1/telemetry", &versioned_telemetry(1), Utc::now()).await;
    h.pipeline
        .process("iot/m1/hello", json!({"v": 2, "seq": 2}).to_string().as_bytes(), Utc::now())
        .await;

    let all = h.archive.list("m1/", true).await.unwrap();
    let top_level = h.archive.list("m1/", false).await.unwrap();

    assert_eq!(all.len(), 2);
    assert!(top_level.is_empty());
}
