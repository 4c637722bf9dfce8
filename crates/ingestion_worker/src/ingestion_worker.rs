use crate::clickhouse::{ClickHouseSinkInitializer, InserterCommitHandle, InserterConfig};
use crate::domain::{
    CommandAckHandler, DeferredSink, DeviceActivityTracker, HelloHandler, IngestionPipeline,
    IngestionStats, MessageRouter, OtaStatusHandler, ReadinessState, RetryPolicy,
    SinkInitializer, StatusHandler, TelemetryHandler, initialize_with_retry,
};
use crate::health::{HealthState, run_health_server};
use crate::mqtt::{MqttSubscriberConfig, run_mqtt_subscriber};
use crate::nats::{NatsSinkConfig, NatsSinkInitializer};
use anyhow::Context;
use collector_runner::{AppProcess, ProcessFuture};
use common::clickhouse::ClickHouseClient;
use common::domain::{ArchiveSink, DeviceEventPublisher, TimeSeriesSink};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ClickHouseSinkConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub table: String,
    pub inserter: InserterConfig,
    pub commit_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct IngestionWorkerConfig {
    pub service_name: String,
    /// Measurement name written on every point
    pub measurement: String,
    pub mqtt: MqttSubscriberConfig,
    pub nats: NatsSinkConfig,
    pub clickhouse: ClickHouseSinkConfig,
    pub sink_retry: RetryPolicy,
    pub health: HealthServerConfig,
}

/// The collector's ingestion module
///
/// Handlers are wired to deferred sinks at construction; the backends are
/// installed later by the sink initialization processes, concurrently with the
/// MQTT connection.
pub struct IngestionWorker {
    config: IngestionWorkerConfig,
    pipeline: Arc<IngestionPipeline>,
    readiness: Arc<ReadinessState>,
    stats: Arc<IngestionStats>,
    activity: Arc<DeviceActivityTracker>,
    timeseries: Arc<DeferredSink<dyn TimeSeriesSink>>,
    nats_initializer: Arc<NatsSinkInitializer>,
    clickhouse_initializer: Arc<ClickHouseSinkInitializer>,
}

impl IngestionWorker {
    pub fn new(config: IngestionWorkerConfig) -> anyhow::Result<Self> {
        info!("Initializing ingestion worker");

        let archive: Arc<DeferredSink<dyn ArchiveSink>> = Arc::new(DeferredSink::new("archive"));
        let events: Arc<DeferredSink<dyn DeviceEventPublisher>> =
            Arc::new(DeferredSink::new("device_events"));
        let timeseries: Arc<DeferredSink<dyn TimeSeriesSink>> =
            Arc::new(DeferredSink::new("timeseries"));

        let activity = Arc::new(DeviceActivityTracker::new());
        let stats = Arc::new(
            IngestionStats::new().context("failed to register ingestion metrics")?,
        );

        let router = MessageRouter::new(
            Arc::new(TelemetryHandler::new(
                archive.clone(),
                timeseries.clone(),
                config.measurement.clone(),
            )),
            Arc::new(HelloHandler::new(archive.clone(), events.clone())),
            Arc::new(StatusHandler::new(
                archive.clone(),
                events.clone(),
                activity.clone(),
            )),
            Arc::new(CommandAckHandler::new(archive.clone(), events.clone())),
            Arc::new(OtaStatusHandler::new(archive.clone(), events.clone())),
        );
        let pipeline = Arc::new(IngestionPipeline::new(
            router,
            activity.clone(),
            stats.clone(),
        ));

        let nats_initializer = Arc::new(NatsSinkInitializer::new(
            config.nats.clone(),
            archive,
            events,
        ));

        let ch = &config.clickhouse;
        let clickhouse_initializer = Arc::new(ClickHouseSinkInitializer::new(
            ClickHouseClient::new(&ch.url, &ch.database, &ch.username, &ch.password),
            ch.table.clone(),
            ch.inserter.clone(),
            timeseries.clone(),
        ));

        Ok(Self {
            config,
            pipeline,
            readiness: Arc::new(ReadinessState::new()),
            stats,
            activity,
            timeseries,
            nats_initializer,
            clickhouse_initializer,
        })
    }

    pub fn readiness(&self) -> Arc<ReadinessState> {
        self.readiness.clone()
    }

    /// Handle for closing the NATS connection at shutdown
    pub fn nats_handle(&self) -> Arc<NatsSinkInitializer> {
        self.nats_initializer.clone()
    }

    /// Named processes for the runner
    pub fn into_runner_processes(self) -> Vec<(String, AppProcess)> {
        let retry = self.config.sink_retry;
        let health_state = HealthState {
            service_name: self.config.service_name.clone(),
            readiness: self.readiness.clone(),
            stats: self.stats.clone(),
            activity: self.activity.clone(),
        };

        let mqtt_subscriber: AppProcess = {
            let config = self.config.mqtt;
            let pipeline = self.pipeline;
            let readiness = self.readiness.clone();
            Box::new(move |ctx: CancellationToken| -> ProcessFuture {
                Box::pin(async move { run_mqtt_subscriber(config, pipeline, readiness, ctx).await })
            })
        };

        let archive_init: AppProcess = {
            let initializer: Arc<dyn SinkInitializer> = self.nats_initializer;
            let readiness = self.readiness.clone();
            Box::new(move |ctx: CancellationToken| -> ProcessFuture {
                Box::pin(async move {
                    let ready = initialize_with_retry(initializer, retry, ctx).await;
                    readiness.set_archive_ready(ready);
                    Ok(())
                })
            })
        };

        let timeseries_init: AppProcess = {
            let initializer: Arc<dyn SinkInitializer> = self.clickhouse_initializer;
            let readiness = self.readiness.clone();
            Box::new(move |ctx: CancellationToken| -> ProcessFuture {
                Box::pin(async move {
                    let ready = initialize_with_retry(initializer, retry, ctx).await;
                    readiness.set_timeseries_ready(ready);
                    Ok(())
                })
            })
        };

        let timeseries_commit: AppProcess = {
            let sink: Arc<dyn TimeSeriesSink> = self.timeseries;
            let interval = self.config.clickhouse.commit_interval;
            Box::new(move |ctx: CancellationToken| -> ProcessFuture {
                Box::pin(async move { InserterCommitHandle::new(sink, interval).run(ctx).await })
            })
        };

        let health_server: AppProcess = {
            let health = self.config.health;
            Box::new(move |ctx: CancellationToken| -> ProcessFuture {
                Box::pin(async move {
                    run_health_server(&health.host, health.port, health_state, ctx).await
                })
            })
        };

        vec![
            ("mqtt_subscriber".to_string(), mqtt_subscriber),
            ("archive_init".to_string(), archive_init),
            ("timeseries_init".to_string(), timeseries_init),
            ("timeseries_commit".to_string(), timeseries_commit),
            ("health_server".to_string(), health_server),
        ]
    }
}

/// Flush the NATS connection if the archive initializer opened one
pub async fn close_nats(initializer: &NatsSinkInitializer) {
    if let Some(client) = initializer.client() {
        client.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IngestionWorkerConfig {
        IngestionWorkerConfig {
            service_name: "mqtt-collector".to_string(),
            measurement: "iot_telemetry".to_string(),
            mqtt: MqttSubscriberConfig::default(),
            nats: NatsSinkConfig {
                url: "nats://localhost:4222".to_string(),
                connect_timeout: Duration::from_secs(1),
                archive_bucket: "iot-data".to_string(),
                events_stream: "device_events".to_string(),
            },
            clickhouse: ClickHouseSinkConfig {
                url: "http://localhost:8123".to_string(),
                database: "iot".to_string(),
                username: "default".to_string(),
                password: String::new(),
                table: "telemetry_points".to_string(),
                inserter: InserterConfig::default(),
                commit_interval: Duration::from_millis(500),
            },
            sink_retry: RetryPolicy::default(),
            health: HealthServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_runner_processes_are_named() {
        let worker = IngestionWorker::new(config()).unwrap();
        assert!(!worker.readiness().is_ready());

        let names: Vec<_> = worker
            .into_runner_processes()
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert_eq!(
            names,
            vec![
                "mqtt_subscriber",
                "archive_init",
                "timeseries_init",
                "timeseries_commit",
                "health_server"
            ]
        );
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let worker = IngestionWorker::new(config()).unwrap();
        close_nats(&worker.nats_handle()).await;
        assert!(worker.nats_handle().client().is_none());
    }
}
