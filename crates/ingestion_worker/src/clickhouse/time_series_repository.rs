use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use clickhouse::inserter::Inserter;
use common::clickhouse::ClickHouseClient;
use common::domain::{DomainResult, RangeQuery, TelemetryPoint, TimeSeriesSink};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct TelemetryPointRow {
    pub measurement: String,
    pub device_id: String,
    pub metric: String,
    pub unit: Option<String>,
    pub value: f64,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
}

impl From<&TelemetryPoint> for TelemetryPointRow {
    fn from(point: &TelemetryPoint) -> Self {
        Self {
            measurement: point.measurement.clone(),
            device_id: point.device_id.clone(),
            metric: point.metric.clone(),
            unit: point.unit.clone(),
            value: point.value,
            timestamp: point.timestamp,
        }
    }
}

impl From<TelemetryPointRow> for TelemetryPoint {
    fn from(row: TelemetryPointRow) -> Self {
        Self {
            measurement: row.measurement,
            device_id: row.device_id,
            metric: row.metric,
            unit: row.unit,
            value: row.value,
            timestamp: row.timestamp,
        }
    }
}

/// DDL for the points table
pub fn create_table_statement(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
            measurement LowCardinality(String), \
            device_id String, \
            metric LowCardinality(String), \
            unit Nullable(String), \
            value Float64, \
            timestamp DateTime64(3, 'UTC')\
        ) ENGINE = MergeTree ORDER BY (device_id, metric, timestamp)",
        table
    )
}

#[derive(Debug, Clone)]
pub struct InserterConfig {
    /// Rows buffered before a commit is due
    pub max_rows: u64,
    /// Time after which a commit is due
    pub period: Duration,
}

impl Default for InserterConfig {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            period: Duration::from_secs(1),
        }
    }
}

/// Time-series sink over a ClickHouse table, buffering writes in an inserter
///
/// Buffered rows reach ClickHouse on `commit` once the inserter limits are hit,
/// or on `flush`. Insert failures surface at that point, not on `write`.
pub struct ClickHouseTimeSeriesRepository {
    client: ClickHouseClient,
    table: String,
    inserter: Mutex<Inserter<TelemetryPointRow>>,
}

impl ClickHouseTimeSeriesRepository {
    pub fn new(client: ClickHouseClient, table: &str, config: InserterConfig) -> Self {
        info!(
            table = %table,
            max_rows = config.max_rows,
            period_ms = config.period.as_millis(),
            "creating ClickHouse time-series repository"
        );

        let inserter = client
            .get_client()
            .inserter::<TelemetryPointRow>(table)
            .with_max_rows(config.max_rows)
            .with_period(Some(config.period));

        Self {
            client,
            table: table.to_string(),
            inserter: Mutex::new(inserter),
        }
    }
}

#[async_trait]
impl TimeSeriesSink for ClickHouseTimeSeriesRepository {
    async fn write(&self, point: &TelemetryPoint) -> DomainResult<()> {
        let row = TelemetryPointRow::from(point);

        let mut inserter = self.inserter.lock().await;
        inserter
            .write(&row)
            .await
            .context("failed to write row to inserter buffer")?;

        debug!(
            device_id = %point.device_id,
            metric = %point.metric,
            "buffered point for ClickHouse insert"
        );
        Ok(())
    }

    async fn query_range(&self, query: &RangeQuery) -> DomainResult<Vec<TelemetryPoint>> {
        let metric_clause = if query.metric.is_some() {
            " AND metric = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT ?fields FROM {} WHERE device_id = ?{} \
             AND timestamp >= fromUnixTimestamp64Milli(?) \
             AND timestamp < fromUnixTimestamp64Milli(?) \
             ORDER BY timestamp",
            self.table, metric_clause
        );

        let mut select = self.client.get_client().query(&sql).bind(&query.device_id);
        if let Some(metric) = &query.metric {
            select = select.bind(metric);
        }

        let rows = select
            .bind(query.start.timestamp_millis())
            .bind(query.end.timestamp_millis())
            .fetch_all::<TelemetryPointRow>()
            .await
            .context("failed to query telemetry range")?;

        debug!(
            device_id = %query.device_id,
            rows = rows.len(),
            "queried telemetry range"
        );
        Ok(rows.into_iter().map(TelemetryPoint::from).collect())
    }

    async fn commit(&self) -> DomainResult<()> {
        let mut inserter = self.inserter.lock().await;
        let stats = inserter
            .commit()
            .await
            .context("failed to commit inserter buffer")?;

        if stats.rows > 0 {
            info!(
                rows = stats.rows,
                transactions = stats.transactions,
                "committed telemetry batch to ClickHouse"
            );
        }
        Ok(())
    }

    async fn flush(&self) -> DomainResult<()> {
        let mut inserter = self.inserter.lock().await;
        let stats = inserter
            .force_commit()
            .await
            .context("failed to flush inserter buffer")?;

        info!(rows = stats.rows, "flushed telemetry buffer to ClickHouse");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config() {
        let config = InserterConfig::default();
        assert_eq!(config.max_rows, 10_000);
        assert_eq!(config.period, Duration::from_secs(1));
    }

    #[test]
    fn test_row_conversion_keeps_tags() {
        let point = TelemetryPoint {
            measurement: "iot_telemetry".to_string(),
            device_id: "dc-meter-007".to_string(),
            metric: "voltage_dc".to_string(),
            unit: Some("V".to_string()),
            value: 756.3,
            timestamp: Utc.with_ymd_and_hms(2026, 2, 12, 10, 0, 1).unwrap(),
        };

        let row = TelemetryPointRow::from(&point);
        assert_eq!(row.metric, "voltage_dc");
        assert_eq!(TelemetryPoint::from(row), point);
    }

    #[test]
    fn test_create_table_statement() {
        let ddl = create_table_statement("iot_telemetry");
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS iot_telemetry ("));
        assert!(ddl.contains("unit Nullable(String)"));
        assert!(ddl.contains("ORDER BY (device_id, metric, timestamp)"));
    }
}
