use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Keep-alive interval in seconds
    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Subscription QoS (0, 1 or 2)
    #[serde(default = "default_mqtt_qos")]
    pub mqtt_qos: u8,

    /// First topic segment, devices publish under `{prefix}/{device_id}/...`
    #[serde(default = "default_mqtt_topic_prefix")]
    pub mqtt_topic_prefix: String,

    #[serde(default = "default_mqtt_clean_session")]
    pub mqtt_clean_session: bool,

    /// Reconnect attempts before the subscriber gives up
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    #[serde(default = "default_mqtt_retry_delay_secs")]
    pub mqtt_retry_delay_secs: u64,

    /// Capacity of the client request channel
    #[serde(default = "default_mqtt_channel_capacity")]
    pub mqtt_channel_capacity: usize,

    // NATS configuration
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Object store bucket holding archived messages
    #[serde(default = "default_nats_archive_bucket")]
    pub nats_archive_bucket: String,

    /// JetStream stream for device events
    #[serde(default = "default_nats_device_events_stream")]
    pub nats_device_events_stream: String,

    /// Connect timeout in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // ClickHouse configuration
    /// ClickHouse HTTP URL
    #[serde(default = "default_clickhouse_url")]
    pub clickhouse_url: String,

    #[serde(default = "default_clickhouse_database")]
    pub clickhouse_database: String,

    #[serde(default = "default_clickhouse_username")]
    pub clickhouse_username: String,

    #[serde(default = "default_clickhouse_password")]
    pub clickhouse_password: String,

    #[serde(default = "default_clickhouse_table")]
    pub clickhouse_table: String,

    /// Measurement name written on every point
    #[serde(default = "default_measurement")]
    pub measurement: String,

    #[serde(default = "default_inserter_max_rows")]
    pub inserter_max_rows: u64,

    #[serde(default = "default_inserter_period_ms")]
    pub inserter_period_ms: u64,

    /// How often buffered points are committed
    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,

    // Sink initialization
    #[serde(default = "default_sink_init_max_attempts")]
    pub sink_init_max_attempts: u32,

    #[serde(default = "default_sink_init_backoff_secs")]
    pub sink_init_backoff_secs: u64,

    // Health server
    #[serde(default = "default_health_host")]
    pub health_host: String,

    #[serde(default = "default_health_port")]
    pub health_port: u16,

    // Telemetry configuration
    /// OpenTelemetry collector endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "mqtt-collector".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    60
}

fn default_mqtt_qos() -> u8 {
    1
}

fn default_mqtt_topic_prefix() -> String {
    "iot".to_string()
}

fn default_mqtt_clean_session() -> bool {
    true
}

fn default_mqtt_max_retry_attempts() -> u32 {
    10
}

fn default_mqtt_retry_delay_secs() -> u64 {
    5
}

fn default_mqtt_channel_capacity() -> usize {
    100
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_archive_bucket() -> String {
    "iot-data".to_string()
}

fn default_nats_device_events_stream() -> String {
    "device_events".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    10
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_clickhouse_database() -> String {
    "iot".to_string()
}

fn default_clickhouse_username() -> String {
    "default".to_string()
}

fn default_clickhouse_password() -> String {
    String::new()
}

fn default_clickhouse_table() -> String {
    "telemetry_points".to_string()
}

fn default_measurement() -> String {
    "iot_telemetry".to_string()
}

fn default_inserter_max_rows() -> u64 {
    10_000
}

fn default_inserter_period_ms() -> u64 {
    1_000
}

fn default_commit_interval_ms() -> u64 {
    500
}

fn default_sink_init_max_attempts() -> u32 {
    10
}

fn default_sink_init_backoff_secs() -> u64 {
    5
}

fn default_health_host() -> String {
    "0.0.0.0".to_string()
}

fn default_health_port() -> u16 {
    8080
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "mqtt-collector".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("COLLECTOR"))
            .build()?
            .try_deserialize()
    }
}
