use async_trait::async_trait;
use common::domain::{
    ArchiveObject, ArchiveSink, DeviceEvent, DeviceEventPublisher, DomainError, DomainResult,
    RangeQuery, TelemetryPoint, TimeSeriesSink,
};
use std::sync::{Arc, OnceLock};

/// A sink installed after startup, once its backend is reachable
///
/// Until then every call fails with [`DomainError::SinkUnavailable`], so handlers
/// can be wired before the backends are up.
pub struct DeferredSink<T: ?Sized> {
    name: &'static str,
    inner: OnceLock<Arc<T>>,
}

impl<T: ?Sized> DeferredSink<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: OnceLock::new(),
        }
    }

    /// Install the backend. Returns false if one was already installed.
    pub fn install(&self, sink: Arc<T>) -> bool {
        self.inner.set(sink).is_ok()
    }

    pub fn is_installed(&self) -> bool {
        self.inner.get().is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn get(&self) -> DomainResult<&Arc<T>> {
        self.inner
            .get()
            .ok_or_else(|| DomainError::SinkUnavailable(format!("{} not initialized", self.name)))
    }
}

#[async_trait]
impl ArchiveSink for DeferredSink<dyn ArchiveSink> {
    async fn put(&self, key: &str, body: bytes::Bytes) -> DomainResult<()> {
        self.get()?.put(key, body).await
    }

    async fn list(&self, prefix: &str, recursive: bool) -> DomainResult<Vec<ArchiveObject>> {
        self.get()?.list(prefix, recursive).await
    }
}

#[async_trait]
impl TimeSeriesSink for DeferredSink<dyn TimeSeriesSink> {
    async fn write(&self, point: &TelemetryPoint) -> DomainResult<()> {
        self.get()?.write(point).await
    }

    async fn query_range(&self, query: &RangeQuery) -> DomainResult<Vec<TelemetryPoint>> {
        self.get()?.query_range(query).await
    }

    async fn commit(&self) -> DomainResult<()> {
        self.get()?.commit().await
    }

    async fn flush(&self) -> DomainResult<()> {
        self.get()?.flush().await
    }
}

#[async_trait]
impl DeviceEventPublisher for DeferredSink<dyn DeviceEventPublisher> {
    async fn publish(&self, event: &DeviceEvent) -> DomainResult<()> {
        self.get()?.publish(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::MockArchiveSink;

    #[tokio::test]
    async fn test_unavailable_until_installed() {
        let deferred: DeferredSink<dyn ArchiveSink> = DeferredSink::new("archive");

        let result = deferred.put("k", bytes::Bytes::from_static(b"{}")).await;
        assert!(matches!(result, Err(DomainError::SinkUnavailable(_))));

        let mut mock = MockArchiveSink::new();
        mock.expect_put().times(1).returning(|_, _| Ok(()));
        assert!(deferred.install(Arc::new(mock)));
        assert!(deferred.is_installed());

        deferred
            .put("k", bytes::Bytes::from_static(b"{}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_second_install_rejected() {
        let deferred: DeferredSink<dyn ArchiveSink> = DeferredSink::new("archive");
        assert!(deferred.install(Arc::new(MockArchiveSink::new())));
        assert!(!deferred.install(Arc::new(MockArchiveSink::new())));
    }
}
