mod config;

use collector_runner::Runner;
use common::telemetry::{TelemetryConfig, TelemetryProviders, init_telemetry, shutdown_telemetry};
use config::ServiceConfig;
use ingestion_worker::clickhouse::InserterConfig;
use ingestion_worker::domain::RetryPolicy;
use ingestion_worker::mqtt::MqttSubscriberConfig;
use ingestion_worker::nats::NatsSinkConfig;
use ingestion_worker::{
    ClickHouseSinkConfig, HealthServerConfig, IngestionWorker, IngestionWorkerConfig, close_nats,
};
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize telemetry (tracing + OpenTelemetry for traces and logs)
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        mqtt_host = %config.mqtt_host,
        mqtt_port = config.mqtt_port,
        otel_enabled = config.otel_enabled,
        "Starting mqtt-collector service"
    );
    debug!("Configuration: {:?}", config);

    let worker = match IngestionWorker::new(worker_config(&config)) {
        Ok(worker) => worker,
        Err(e) => {
            error!("Failed to initialize ingestion worker: {:#}", e);
            std::process::exit(1);
        }
    };
    let nats = worker.nats_handle();

    let mut runner = Runner::new();
    for (name, process) in worker.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            close_nats(&nats).await;

            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

fn worker_config(config: &ServiceConfig) -> IngestionWorkerConfig {
    IngestionWorkerConfig {
        service_name: config.otel_service_name.clone(),
        measurement: config.measurement.clone(),
        mqtt: MqttSubscriberConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            client_id: config.mqtt_client_id.clone(),
            keep_alive: Duration::from_secs(config.mqtt_keep_alive_secs),
            clean_session: config.mqtt_clean_session,
            qos: config.mqtt_qos,
            topic_prefix: config.mqtt_topic_prefix.clone(),
            max_retry_attempts: config.mqtt_max_retry_attempts,
            retry_delay: Duration::from_secs(config.mqtt_retry_delay_secs),
            channel_capacity: config.mqtt_channel_capacity,
        },
        nats: NatsSinkConfig {
            url: config.nats_url.clone(),
            connect_timeout: Duration::from_secs(config.startup_timeout_secs),
            archive_bucket: config.nats_archive_bucket.clone(),
            events_stream: config.nats_device_events_stream.clone(),
        },
        clickhouse: ClickHouseSinkConfig {
            url: config.clickhouse_url.clone(),
            database: config.clickhouse_database.clone(),
            username: config.clickhouse_username.clone(),
            password: config.clickhouse_password.clone(),
            table: config.clickhouse_table.clone(),
            inserter: InserterConfig {
                max_rows: config.inserter_max_rows,
                period: Duration::from_millis(config.inserter_period_ms),
            },
            commit_interval: Duration::from_millis(config.commit_interval_ms),
        },
        sink_retry: RetryPolicy {
            max_attempts: config.sink_init_max_attempts,
            backoff: Duration::from_secs(config.sink_init_backoff_secs),
        },
        health: HealthServerConfig {
            host: config.health_host.clone(),
            port: config.health_port,
        },
    }
}
