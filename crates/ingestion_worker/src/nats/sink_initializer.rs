use crate::domain::{DeferredSink, SinkInitializer};
use crate::nats::DeviceEventProducer;
use async_trait::async_trait;
use common::domain::{ArchiveSink, DeviceEventPublisher};
use common::nats::{NatsClient, NatsObjectStoreArchive};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct NatsSinkConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub archive_bucket: String,
    pub events_stream: String,
}

/// Connects to NATS, then installs the object-store archive and the device event
/// publisher
pub struct NatsSinkInitializer {
    config: NatsSinkConfig,
    archive: Arc<DeferredSink<dyn ArchiveSink>>,
    events: Arc<DeferredSink<dyn DeviceEventPublisher>>,
    client: OnceLock<Arc<NatsClient>>,
}

impl NatsSinkInitializer {
    pub fn new(
        config: NatsSinkConfig,
        archive: Arc<DeferredSink<dyn ArchiveSink>>,
        events: Arc<DeferredSink<dyn DeviceEventPublisher>>,
    ) -> Self {
        Self {
            config,
            archive,
            events,
            client: OnceLock::new(),
        }
    }

    /// The connected client, once initialization got that far
    pub fn client(&self) -> Option<Arc<NatsClient>> {
        self.client.get().cloned()
    }

    async fn connected_client(&self) -> anyhow::Result<Arc<NatsClient>> {
        if let Some(client) = self.client.get() {
            return Ok(client.clone());
        }
        let client = Arc::new(NatsClient::connect(&self.config.url, self.config.connect_timeout).await?);
        // initialize never runs concurrently with itself
        let _ = self.client.set(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl SinkInitializer for NatsSinkInitializer {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        let client = self.connected_client().await?;

        if !self.events.is_installed() {
            client
                .ensure_stream(&self.config.events_stream, "Device lifecycle events")
                .await?;
            let producer = DeviceEventProducer::new(
                client.create_publisher_client(),
                self.config.events_stream.clone(),
            );
            self.events.install(Arc::new(producer));
            info!(stream = %self.config.events_stream, "device event publisher installed");
        }

        if !self.archive.is_installed() {
            let archive =
                NatsObjectStoreArchive::new(client.jetstream(), &self.config.archive_bucket).await?;
            self.archive.install(Arc::new(archive));
            info!(bucket = %self.config.archive_bucket, "archive sink installed");
        }

        Ok(())
    }
}
