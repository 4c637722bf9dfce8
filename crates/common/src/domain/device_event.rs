use crate::domain::envelope::{AckResult, Category, DeviceStatus};
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device-level facts extracted from non-telemetry messages, published for the
/// device registry and command tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEvent {
    Hello {
        device_id: String,
        timestamp: DateTime<Utc>,
        fw_version: Option<String>,
        uptime_s: Option<u64>,
    },
    Status {
        device_id: String,
        timestamp: DateTime<Utc>,
        status: DeviceStatus,
    },
    CommandAck {
        device_id: String,
        timestamp: DateTime<Utc>,
        cmd_id: Option<String>,
        result: AckResult,
        detail: Option<String>,
    },
    OtaStatus {
        device_id: String,
        timestamp: DateTime<Utc>,
        cmd_id: Option<String>,
        ota_state: Option<String>,
        progress_pct: Option<i64>,
    },
}

impl DeviceEvent {
    pub fn device_id(&self) -> &str {
        match self {
            DeviceEvent::Hello { device_id, .. }
            | DeviceEvent::Status { device_id, .. }
            | DeviceEvent::CommandAck { device_id, .. }
            | DeviceEvent::OtaStatus { device_id, .. } => device_id,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            DeviceEvent::Hello { .. } => Category::Hello,
            DeviceEvent::Status { .. } => Category::Status,
            DeviceEvent::CommandAck { .. } => Category::CommandAck,
            DeviceEvent::OtaStatus { .. } => Category::OtaStatus,
        }
    }
}

/// Trait for publishing device events to the message broker
///
/// Implementations should:
/// - Serialize the event (JSON)
/// - Publish to the broker (NATS JetStream)
/// - Return error if publish fails
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceEventPublisher: Send + Sync {
    async fn publish(&self, event: &DeviceEvent) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_by_kind() {
        let event = DeviceEvent::CommandAck {
            device_id: "dc-meter-007".to_string(),
            timestamp: Utc::now(),
            cmd_id: Some("cmd-1".to_string()),
            result: AckResult::Rejected,
            detail: None,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "command_ack");
        assert_eq!(json["result"], "rejected");
        assert_eq!(event.category(), Category::CommandAck);
        assert_eq!(event.device_id(), "dc-meter-007");
    }
}
