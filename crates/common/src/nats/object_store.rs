use crate::domain::{ArchiveObject, ArchiveSink, DomainResult, matches_listing};
use anyhow::{Context, Result};
use async_nats::jetstream;
use async_trait::async_trait;
use chrono::DateTime;
use futures::StreamExt;
use tracing::{debug, instrument};

/// Archive backed by a JetStream object store bucket
pub struct NatsObjectStoreArchive {
    bucket: String,
    store: jetstream::object_store::ObjectStore,
}

impl NatsObjectStoreArchive {
    /// Open the bucket, creating it when it does not exist yet
    pub async fn new(jetstream: &jetstream::Context, bucket_name: &str) -> Result<Self> {
        debug!(bucket = %bucket_name, "initializing archive bucket");

        let store = match jetstream.get_object_store(bucket_name).await {
            Ok(store) => {
                debug!(bucket = %bucket_name, "archive bucket already exists");
                store
            }
            Err(_) => {
                debug!(bucket = %bucket_name, "creating archive bucket");
                jetstream
                    .create_object_store(jetstream::object_store::Config {
                        bucket: bucket_name.to_string(),
                        description: Some("Raw device messages".to_string()),
                        ..Default::default()
                    })
                    .await
                    .context("failed to create archive bucket")?
            }
        };

        Ok(Self {
            bucket: bucket_name.to_string(),
            store,
        })
    }
}

#[async_trait]
impl ArchiveSink for NatsObjectStoreArchive {
    #[instrument(skip(self, body), fields(bucket = %self.bucket, size = body.len()))]
    async fn put(&self, key: &str, body: bytes::Bytes) -> DomainResult<()> {
        let mut reader = &body[..];
        self.store
            .put(key, &mut reader)
            .await
            .context("failed to upload archive object")?;
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str, recursive: bool) -> DomainResult<Vec<ArchiveObject>> {
        let mut entries = self
            .store
            .list()
            .await
            .context("failed to list archive bucket")?;

        let mut objects = Vec::new();
        while let Some(entry) = entries.next().await {
            let info = entry.context("failed to read archive listing entry")?;
            if info.deleted || !matches_listing(&info.name, prefix, recursive) {
                continue;
            }
            objects.push(ArchiveObject {
                last_modified: info
                    .modified
                    .and_then(|m| DateTime::from_timestamp(m.unix_timestamp(), 0)),
                size: info.size as u64,
                key: info.name,
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(prefix = %prefix, recursive, count = objects.len(), "listed archive objects");
        Ok(objects)
    }
}
