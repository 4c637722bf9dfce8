#![cfg(feature = "integration-tests")]

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::clickhouse::ClickHouseClient;
use common::domain::{RangeQuery, TelemetryPoint, TimeSeriesSink};
use ingestion_worker::clickhouse::{ClickHouseSinkInitializer, InserterConfig};
use ingestion_worker::domain::{DeferredSink, SinkInitializer};
use std::sync::Arc;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::clickhouse::ClickHouse;

const TABLE: &str = "telemetry_points";

async fn start_sink() -> (ContainerAsync<ClickHouse>, Arc<DeferredSink<dyn TimeSeriesSink>>) {
    let container = ClickHouse::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(8123).await.unwrap();

    let client = ClickHouseClient::new(&format!("http://{}:{}", host, port), "default", "default", "");
    let sink: Arc<DeferredSink<dyn TimeSeriesSink>> = Arc::new(DeferredSink::new("timeseries"));
    let initializer = ClickHouseSinkInitializer::new(client, TABLE, InserterConfig::default(), sink.clone());

    initializer.initialize().await.unwrap();
    assert!(sink.is_installed());

    // initializing again is a no-op once the sink is installed
    initializer.initialize().await.unwrap();

    (container, sink)
}

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 12, 10, 0, 0).unwrap()
}

fn point(device_id: &str, metric: &str, unit: Option<&str>, value: f64, offset_s: i64) -> TelemetryPoint {
    TelemetryPoint {
        measurement: "iot_telemetry".to_string(),
        device_id: device_id.to_string(),
        metric: metric.to_string(),
        unit: unit.map(String::from),
        value,
        timestamp: base() + Duration::seconds(offset_s),
    }
}

async fn seed(sink: &dyn TimeSeriesSink) {
    let points = [
        point("dc-meter-007", "voltage_dc", Some("V"), 756.3, 0),
        point("dc-meter-007", "current_dc", Some("A"), 312.8, 0),
        point("dc-meter-007", "voltage_dc", Some("V"), 757.1, 10),
        point("dc-meter-007", "voltage_dc", Some("V"), 758.0, 20),
        point("legacy-1", "temperature", None, 23.5, 5),
    ];
    for p in &points {
        sink.write(p).await.unwrap();
    }
    sink.flush().await.unwrap();
}

#[tokio::test]
async fn test_query_range_by_device() {
    let (_container, sink) = start_sink().await;
    seed(sink.as_ref()).await;

    let points = sink
        .query_range(&RangeQuery {
            device_id: "dc-meter-007".to_string(),
            metric: None,
            start: base(),
            end: base() + Duration::seconds(60),
        })
        .await
        .unwrap();

    assert_eq!(points.len(), 4);
    assert!(points.iter().all(|p| p.device_id == "dc-meter-007"));
    assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(points.last().unwrap().timestamp, base() + Duration::seconds(20));
}

#[tokio::test]
async fn test_query_range_by_metric_keeps_tags() {
    let (_container, sink) = start_sink().await;
    seed(sink.as_ref()).await;

    let voltage = sink
        .query_range(&RangeQuery {
            device_id: "dc-meter-007".to_string(),
            metric: Some("voltage_dc".to_string()),
            start: base(),
            end: base() + Duration::seconds(60),
        })
        .await
        .unwrap();

    assert_eq!(voltage.len(), 3);
    assert_eq!(voltage[0], point("dc-meter-007", "voltage_dc", Some("V"), 756.3, 0));

    let legacy = sink
        .query_range(&RangeQuery {
            device_id: "legacy-1".to_string(),
            metric: Some("temperature".to_string()),
            start: base(),
            end: base() + Duration::seconds(60),
        })
        .await
        .unwrap();

    assert_eq!(legacy.len(), 1);
    assert_eq!(legacy[0].unit, None);
}

#[tokio::test]
async fn test_query_range_is_half_open() {
    let (_container, sink) = start_sink().await;
    seed(sink.as_ref()).await;

    let points = sink
        .query_range(&RangeQuery {
            device_id: "dc-meter-007".to_string(),
            metric: Some("voltage_dc".to_string()),
            start: base() + Duration::seconds(10),
            end: base() + Duration::seconds(20),
        })
        .await
        .unwrap();

    assert_eq!(points.len(), 1);
    assert_eq!(points[0].timestamp, base() + Duration::seconds(10));
    assert_eq!(points[0].value, 757.1);
}

#[tokio::test]
async fn test_unflushed_points_not_visible_until_flush() {
    let (_container, sink) = start_sink().await;
    let query = RangeQuery {
        device_id: "m1".to_string(),
        metric: None,
        start: base(),
        end: base() + Duration::seconds(60),
    };

    sink.write(&point("m1", "power_dc", Some("kW"), 236.0, 1))
        .await
        .unwrap();
    assert!(sink.query_range(&query).await.unwrap().is_empty());

    sink.flush().await.unwrap();
    assert_eq!(sink.query_range(&query).await.unwrap().len(), 1);
}
