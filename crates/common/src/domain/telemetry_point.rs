use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One time-series sample: `measurement` with tags `device_id`, `metric`, `unit?`
/// and a single float `value` field.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPoint {
    pub measurement: String,
    pub device_id: String,
    pub metric: String,
    pub unit: Option<String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Half-open time range `[start, end)` over one device, optionally narrowed to one metric
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub device_id: String,
    pub metric: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Time-series storage backend
///
/// Implementations may buffer writes. `commit` sends what the batching limits say
/// is due, `flush` sends everything buffered.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    /// Write a single point
    async fn write(&self, point: &TelemetryPoint) -> DomainResult<()>;

    /// Read points in a time range, ordered by timestamp
    async fn query_range(&self, query: &RangeQuery) -> DomainResult<Vec<TelemetryPoint>>;

    /// Send buffered points once the batch is due
    async fn commit(&self) -> DomainResult<()>;

    /// Send all buffered points now
    async fn flush(&self) -> DomainResult<()>;
}
