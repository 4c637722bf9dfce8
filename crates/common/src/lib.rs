pub mod clickhouse;
pub mod domain;
pub mod nats;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockArchiveSink;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceEventPublisher;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockTimeSeriesSink;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamPublisher;
