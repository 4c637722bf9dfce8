use crate::clickhouse::{ClickHouseTimeSeriesRepository, InserterConfig, create_table_statement};
use crate::domain::{DeferredSink, SinkInitializer};
use anyhow::Context;
use async_trait::async_trait;
use common::clickhouse::ClickHouseClient;
use common::domain::TimeSeriesSink;
use std::sync::Arc;
use tracing::info;

/// Pings ClickHouse, creates the points table and installs the repository
pub struct ClickHouseSinkInitializer {
    client: ClickHouseClient,
    table: String,
    inserter: InserterConfig,
    target: Arc<DeferredSink<dyn TimeSeriesSink>>,
}

impl ClickHouseSinkInitializer {
    pub fn new(
        client: ClickHouseClient,
        table: impl Into<String>,
        inserter: InserterConfig,
        target: Arc<DeferredSink<dyn TimeSeriesSink>>,
    ) -> Self {
        Self {
            client,
            table: table.into(),
            inserter,
            target,
        }
    }
}

#[async_trait]
impl SinkInitializer for ClickHouseSinkInitializer {
    fn name(&self) -> &'static str {
        "timeseries"
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        if self.target.is_installed() {
            return Ok(());
        }

        self.client.ping().await?;
        self.client
            .execute(&create_table_statement(&self.table))
            .await
            .context("failed to create telemetry table")?;

        let repository =
            ClickHouseTimeSeriesRepository::new(self.client.clone(), &self.table, self.inserter.clone());
        self.target.install(Arc::new(repository));

        info!(table = %self.table, "ClickHouse time-series sink installed");
        Ok(())
    }
}
