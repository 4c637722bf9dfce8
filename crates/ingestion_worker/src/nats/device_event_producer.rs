use async_trait::async_trait;
use common::domain::{DeviceEvent, DeviceEventPublisher, DomainError, DomainResult};
use common::nats::JetStreamPublisher;
use std::sync::Arc;
use tracing::debug;

/// Publishes device events as JSON to `{stream}.{device_id}.{kind}`
pub struct DeviceEventProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
    base_subject: String,
}

impl DeviceEventProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, base_subject: String) -> Self {
        debug!(base_subject = %base_subject, "initialized DeviceEventProducer");
        Self {
            jetstream,
            base_subject,
        }
    }

    pub fn subject_for(&self, event: &DeviceEvent) -> String {
        format!(
            "{}.{}.{}",
            self.base_subject,
            escape_token(event.device_id()),
            event.category()
        )
    }
}

/// Percent-escape separators, wildcards, whitespace and `%` itself, so distinct
/// device ids always map to distinct subject tokens
fn escape_token(token: &str) -> String {
    let mut escaped = String::with_capacity(token.len());
    for c in token.chars() {
        match c {
            '.' | '*' | '>' | '%' => escaped.push_str(&format!("%{:02X}", c as u32)),
            c if c.is_whitespace() => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    escaped.push_str(&format!("%{:02X}", byte));
                }
            }
            c => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
impl DeviceEventPublisher for DeviceEventProducer {
    async fn publish(&self, event: &DeviceEvent) -> DomainResult<()> {
        let payload = serde_json::to_vec(event).map_err(|e| {
            DomainError::RepositoryError(anyhow::anyhow!("failed to encode device event: {}", e))
        })?;
        let subject = self.subject_for(event);

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(DomainError::RepositoryError)?;

        debug!(subject = %subject, "published device event");
        Ok(())
    }
}
